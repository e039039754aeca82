use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mineops::cache::QueryCache;
use mineops::client::{memory, Backend, RestBackend};
use mineops::config::{self, Config};
use mineops::models::{EntityKind, Outcome, Record, RecordId, ReviewStatus};
use mineops::view::notice::NoticeLevel;
use mineops::view::table::EntityTable;
use mineops::workflow::decision::{DecisionDialog, DecisionEffect, DecisionPanel};
use mineops::workflow::form::{FormFlow, FormStep};
use mineops::workflow::schema::FormSchema;
use mineops::workflow::upload::Attachment;

mod cli;

/// Everything a command needs to talk to the back office.
struct Context {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    config: Config,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(config::log_json_requested(|key| std::env::var(key).ok()));

    let args = cli::Cli::parse();
    let cfg = config::load(args.offline)?;

    let backend: Arc<dyn Backend> = if args.offline {
        tracing::info!("using the offline demo backend");
        Arc::new(memory::demo_backend())
    } else {
        Arc::new(RestBackend::from_config(&cfg)?)
    };
    let ctx = Context {
        backend,
        cache: QueryCache::new(Duration::from_secs(cfg.cache_ttl_secs)),
        config: cfg,
        json: args.json,
    };

    let result = match args.command {
        cli::Commands::List {
            kind,
            search,
            status,
            role,
            sort,
            desc,
            page,
            page_size,
        } => {
            let query = ListArgs {
                search,
                status,
                role,
                sort,
                desc,
                page,
                page_size,
            };
            handle_list(&ctx, parse_kind(&kind)?, query).await
        }
        cli::Commands::Show { kind, id } => handle_show(&ctx, parse_kind(&kind)?, id.into()).await,
        cli::Commands::Approve { kind, id } => {
            handle_decision(&ctx, parse_kind(&kind)?, id.into(), Outcome::Approve, None).await
        }
        cli::Commands::Reject { kind, id, reason } => {
            handle_decision(&ctx, parse_kind(&kind)?, id.into(), Outcome::Reject, Some(reason)).await
        }
        cli::Commands::PushBack { kind, id, reason } => {
            handle_decision(&ctx, parse_kind(&kind)?, id.into(), Outcome::PushBack, Some(reason)).await
        }
        cli::Commands::Delete { kind, id, yes } => {
            handle_delete(&ctx, parse_kind(&kind)?, id.into(), yes).await
        }
        cli::Commands::Create { kind, fields, files } => {
            handle_create(&ctx, parse_kind(&kind)?, fields, files).await
        }
        cli::Commands::Kinds => {
            handle_kinds();
            Ok(())
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "mineops=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_kind(raw: &str) -> anyhow::Result<EntityKind> {
    raw.parse().map_err(anyhow::Error::msg)
}

/// Shorten `text` to `width` characters for a table cell.
fn cell(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct ListArgs {
    search: Option<String>,
    status: Option<String>,
    role: Option<String>,
    sort: Option<String>,
    desc: bool,
    page: usize,
    page_size: Option<usize>,
}

async fn handle_list(ctx: &Context, kind: EntityKind, args: ListArgs) -> anyhow::Result<()> {
    let page_size = args.page_size.unwrap_or(ctx.config.page_size);
    let mut table = EntityTable::new(ctx.backend.clone(), ctx.cache.clone(), kind, page_size);
    table.load().await?;

    if let Some(search) = args.search {
        table.set_search(search);
    }
    if let Some(status) = args.status {
        let status: ReviewStatus = status.parse().map_err(anyhow::Error::msg)?;
        table.set_status(Some(status));
    }
    table.set_role(args.role.as_deref());
    if let Some(field) = args.sort.as_deref() {
        table.toggle_sort(field);
        if args.desc {
            table.toggle_sort(field);
        }
    }
    table.set_page(args.page);

    let page = table.visible();
    if ctx.json {
        return print_json(&page.rows);
    }
    if page.total == 0 {
        println!("No {} found.", kind.descriptor().label.to_lowercase());
        return Ok(());
    }

    let columns = kind.descriptor().columns;
    let mut header = format!("{:<10}", "ID");
    for col in columns {
        header.push_str(&format!(" {:<20}", col.header.to_uppercase()));
    }
    println!("{}", header.trim_end());
    for row in &page.rows {
        let mut line = format!("{:<10}", cell(row.id.as_str(), 10));
        for col in columns {
            let value = row.field_text(col.field).unwrap_or_default();
            line.push_str(&format!(" {:<20}", cell(&value, 20)));
        }
        println!("{}", line.trim_end());
    }
    println!(
        "\nPage {}/{} ({} {})",
        page.page,
        page.total_pages,
        page.total,
        kind.descriptor().label.to_lowercase()
    );
    Ok(())
}

fn decision_dialog(ctx: &Context, kind: EntityKind) -> DecisionDialog {
    DecisionDialog::new(
        ctx.backend.clone(),
        ctx.cache.clone(),
        kind,
        ctx.config.review_policy(),
    )
}

fn print_record(record: &Record) {
    println!("{:<20} {}", "id", record.id);
    if let Some(status) = record.status {
        println!("{:<20} {}", "status", status.label());
    }
    if let Some(reason) = &record.reason {
        println!("{:<20} {}", "reason", reason);
    }
    for name in record.fields.keys() {
        let value = record.field_text(name).unwrap_or_default();
        println!("{:<20} {}", name, cell(&value, 60));
    }
}

async fn handle_show(ctx: &Context, kind: EntityKind, id: RecordId) -> anyhow::Result<()> {
    let dialog = decision_dialog(ctx, kind);
    dialog.open(Some(id));
    dialog.load().await?;
    let Some(record) = dialog.record() else {
        anyhow::bail!("record could not be loaded");
    };

    if ctx.json {
        return print_json(&record);
    }
    print_record(&record);

    let tabs: Vec<&str> = dialog.tabs().iter().map(|t| t.title()).collect();
    println!("\nTabs: {}", tabs.join(", "));
    match dialog.panel() {
        Some(DecisionPanel::AlreadyApproved) => println!("This record is already approved."),
        Some(DecisionPanel::Outcomes(outcomes)) => {
            let verbs: Vec<&str> = outcomes.iter().map(|o| o.verb()).collect();
            println!("Available decisions: {}", verbs.join(", "));
        }
        None => {}
    }
    Ok(())
}

async fn handle_decision(
    ctx: &Context,
    kind: EntityKind,
    id: RecordId,
    outcome: Outcome,
    reason: Option<String>,
) -> anyhow::Result<()> {
    let dialog = decision_dialog(ctx, kind);
    dialog.open(Some(id.clone()));
    dialog.load().await?;

    if let Some(reason) = reason {
        dialog.set_reason(reason);
    }
    let effect = match dialog.choose(outcome).await {
        Ok(Some(effect)) => Ok(effect),
        Ok(None) => dialog.submit().await,
        Err(e) => Err(e),
    }
    .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!(
        "{} {} is now {}.",
        kind.descriptor().label.trim_end_matches('s'),
        id,
        outcome.target_status().label()
    );
    if effect == DecisionEffect::ReloadPage {
        println!("Related lists changed; reload any open views.");
    }
    Ok(())
}

async fn handle_delete(ctx: &Context, kind: EntityKind, id: RecordId, yes: bool) -> anyhow::Result<()> {
    let mut table = EntityTable::new(ctx.backend.clone(), ctx.cache.clone(), kind, ctx.config.page_size);
    let staged = table.request_delete(id.clone());
    if staged.is_ok() && !yes {
        println!("About to delete {} from {}. Re-run with --yes to confirm.", id, kind);
        table.cancel_delete();
        return Ok(());
    }
    let result = match staged {
        Ok(()) => table.confirm_delete().await,
        Err(e) => Err(e),
    };
    for notice in table.notices().drain() {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("{}", notice.message),
        }
    }
    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

async fn handle_create(
    ctx: &Context,
    kind: EntityKind,
    fields: Vec<(String, String)>,
    files: Vec<(String, std::path::PathBuf)>,
) -> anyhow::Result<()> {
    let mut form = FormFlow::new(FormSchema::for_kind(kind));
    form.open_create();

    for (name, value) in fields {
        if form.schema().field(&name).is_none() {
            tracing::warn!(field = %name, kind = %kind, "ignoring unknown field");
            continue;
        }
        form.set(&name, value);
    }

    let mut grouped: BTreeMap<String, Vec<Attachment>> = BTreeMap::new();
    for (name, path) in files {
        grouped.entry(name).or_default().push(Attachment::from_path(&path)?);
    }
    for (name, attachments) in grouped {
        form.attach(&name, attachments)
            .map_err(|e| anyhow::anyhow!("{}: {}", name, e.user_message()))?;
    }

    while form.step() != FormStep::Review {
        if form.next().is_err() {
            eprintln!("{} step is incomplete:", form.step().title());
            for name in form.errors().fields() {
                eprintln!("  {:<20} {}", name, form.errors().get(name).unwrap_or_default());
            }
            anyhow::bail!("fix the fields above and try again");
        }
    }

    for line in form.review() {
        println!("{:<24} {}", line.label, cell(&line.value, 60));
    }

    let reference = form
        .submit(ctx.backend.as_ref(), &ctx.cache)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    match (form.step(), reference) {
        (FormStep::GeneratedId, Some(reference)) => println!("\nCreated. Generated ID: {}", reference),
        (_, Some(reference)) => println!("\nCreated ({}).", reference),
        (_, None) => println!("\nCreated."),
    }
    form.close();
    Ok(())
}

fn handle_kinds() {
    println!(
        "{:<20} {:<22} {:<10} {:<10} INVALIDATES",
        "KIND", "LABEL", "REVIEW", "DELETE"
    );
    for kind in EntityKind::ALL {
        let d = kind.descriptor();
        let invalidates: Vec<&str> = d.invalidates.iter().map(|k| k.as_str()).collect();
        println!(
            "{:<20} {:<22} {:<10} {:<10} {}",
            d.path,
            d.label,
            if d.reviewable { "yes" } else { "no" },
            if d.deletable { "yes" } else { "no" },
            invalidates.join(", ")
        );
    }
}
