//! End-to-end review flows against the in-memory backend: a table and a
//! decision dialog sharing one query cache.

mod review_flow_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use mineops::cache::QueryCache;
    use mineops::client::memory::{demo_backend, MemoryBackend};
    use mineops::models::{EntityKind, Outcome, Record, RecordId, ReviewStatus};
    use mineops::view::table::EntityTable;
    use mineops::workflow::decision::{DecisionDialog, DecisionEffect, DecisionPanel};
    use mineops::workflow::form::FormFlow;
    use mineops::workflow::schema::FormSchema;
    use mineops::workflow::transition::ReviewPolicy;

    fn cache() -> QueryCache {
        QueryCache::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_reject_refreshes_owning_table_once() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(EntityKind::OreReceival, Record::new("41").with_status(ReviewStatus::Approved));
        backend.insert(EntityKind::OreReceival, Record::new("42").with_status(ReviewStatus::Pending));
        let cache = cache();

        let mut table = EntityTable::new(backend.clone(), cache.clone(), EntityKind::OreReceival, 10);
        table.load().await.unwrap();

        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let dialog = DecisionDialog::new(
            backend.clone(),
            cache.clone(),
            EntityKind::OreReceival,
            ReviewPolicy::default(),
        )
        .with_refresh(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        dialog.open(Some(RecordId::from("42")));
        dialog.load().await.unwrap();
        dialog.choose(Outcome::Reject).await.unwrap();
        dialog.set_reason("Damaged load");
        assert_eq!(dialog.submit().await.unwrap(), DecisionEffect::Refresh);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        // the table notices the invalidation without being told
        assert!(table.sync().await.unwrap());
        table.set_status(Some(ReviewStatus::Rejected));
        let page = table.visible();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].id.as_str(), "42");
        assert_eq!(page.rows[0].reason.as_deref(), Some("Damaged load"));
    }

    #[tokio::test]
    async fn test_approved_record_shows_notice_only() {
        let backend = Arc::new(demo_backend());
        let dialog = DecisionDialog::new(backend.clone(), cache(), EntityKind::Miner, ReviewPolicy::default());
        dialog.open(Some(RecordId::from("2")));
        dialog.load().await.unwrap();
        assert_eq!(dialog.panel(), Some(DecisionPanel::AlreadyApproved));

        let reopened = DecisionDialog::new(
            backend,
            cache(),
            EntityKind::Miner,
            ReviewPolicy {
                approved_is_terminal: false,
            },
        );
        reopened.open(Some(RecordId::from("2")));
        reopened.load().await.unwrap();
        assert_eq!(reopened.panel(), Some(DecisionPanel::Outcomes(Outcome::ALL.to_vec())));
    }

    #[tokio::test]
    async fn test_decision_invalidates_dependent_lists() {
        let backend = Arc::new(demo_backend());
        let cache = cache();
        let mut transports = EntityTable::new(backend.clone(), cache.clone(), EntityKind::Transport, 10);
        transports.load().await.unwrap();

        let dialog = DecisionDialog::new(backend.clone(), cache.clone(), EntityKind::OreReceival, ReviewPolicy::default());
        dialog.open(Some(RecordId::from("42")));
        dialog.load().await.unwrap();
        dialog.choose(Outcome::Approve).await.unwrap();

        assert_eq!(cache.generation(EntityKind::SecurityDispatch), 1);
        assert!(transports.sync().await.unwrap());
        assert_eq!(backend.calls_to("fetch_list"), 2);
    }

    #[tokio::test]
    async fn test_opening_and_closing_forms_calls_nothing() {
        let backend = demo_backend();
        let before = backend.count(EntityKind::Tax);
        let mut form = FormFlow::new(FormSchema::for_kind(EntityKind::Tax));
        for _ in 0..3 {
            form.open_create();
            form.set("taxType", "Levy");
            assert!(!form.close().refresh_parent);
        }
        assert!(backend.calls().is_empty());
        assert_eq!(backend.count(EntityKind::Tax), before);
    }

    #[tokio::test]
    async fn test_non_reviewable_kind_has_no_panel() {
        let backend = Arc::new(demo_backend());
        let dialog = DecisionDialog::new(backend, cache(), EntityKind::Tax, ReviewPolicy::default());
        dialog.open(Some(RecordId::from("3")));
        dialog.load().await.unwrap();
        assert!(dialog.record().is_some());
        assert_eq!(dialog.panel(), None);
        assert!(dialog.choose(Outcome::Approve).await.is_err());
    }
}
