use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mineops: review queue and records for the mining back-office
#[derive(Parser)]
#[command(name = "mineops", version, about)]
pub struct Cli {
    /// Use a seeded in-memory backend instead of the API
    #[arg(long, global = true, env = "MINEOPS_OFFLINE")]
    pub offline: bool,

    /// Print records as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List records of one kind
    List {
        /// Entity kind, e.g. miners, ore-receivals, vehicles
        kind: String,
        #[arg(short, long)]
        search: Option<String>,
        /// PENDING, APPROVED, REJECTED or PUSHED_BACK
        #[arg(long)]
        status: Option<String>,
        /// Filter on the kind's position/role field
        #[arg(long)]
        role: Option<String>,
        /// Sort by this field instead of newest-first
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, requires = "sort")]
        desc: bool,
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show one record in full
    Show { kind: String, id: String },

    /// Approve a record
    Approve { kind: String, id: String },

    /// Reject a record
    Reject {
        kind: String,
        id: String,
        #[arg(short, long)]
        reason: String,
    },

    /// Send a record back for revision
    PushBack {
        kind: String,
        id: String,
        #[arg(short, long)]
        reason: String,
    },

    /// Delete a record
    Delete {
        kind: String,
        id: String,
        /// Confirm the delete; without it the command only reports what it would do
        #[arg(long)]
        yes: bool,
    },

    /// Create a record through the kind's form
    Create {
        kind: String,
        /// Field value as name=value (repeatable)
        #[arg(short, long = "field", value_parser = parse_pair)]
        fields: Vec<(String, String)>,
        /// File attachment as field=path (repeatable)
        #[arg(long = "file", value_parser = parse_file)]
        files: Vec<(String, PathBuf)>,
    },

    /// List the entity kinds and what they support
    Kinds,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn parse_file(raw: &str) -> Result<(String, PathBuf), String> {
    parse_pair(raw).map(|(k, v)| (k, PathBuf::from(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reject() {
        let cli = Cli::parse_from([
            "mineops",
            "reject",
            "ore-receivals",
            "42",
            "--reason",
            "Damaged load",
        ]);
        match cli.command {
            Commands::Reject { kind, id, reason } => {
                assert_eq!(kind, "ore-receivals");
                assert_eq!(id, "42");
                assert_eq!(reason, "Damaged load");
            }
            _ => panic!("expected reject"),
        }
    }

    #[test]
    fn test_parse_create_pairs() {
        let cli = Cli::parse_from([
            "mineops",
            "--offline",
            "create",
            "taxes",
            "-f",
            "taxType=Royalty",
            "--field",
            "description=a=b",
        ]);
        assert!(cli.offline);
        match cli.command {
            Commands::Create { fields, files, .. } => {
                assert_eq!(fields[0], ("taxType".to_string(), "Royalty".to_string()));
                assert_eq!(fields[1].1, "a=b");
                assert!(files.is_empty());
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_bad_pair_rejected() {
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }
}
