use std::sync::Arc;

use super::list::{self, FieldFilter, ListQuery, Page, SortState};
use super::notice::Notices;
use crate::cache::QueryCache;
use crate::client::Backend;
use crate::errors::{BackofficeError, Result};
use crate::models::{EntityKind, Record, RecordId, ReviewStatus};

/// Callback a parent hands to its children so they can ask it to refetch.
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum TableState {
    Idle,
    Loading,
    Loaded(Arc<Vec<Record>>),
    Failed { message: String },
}

/// List view-model for one entity kind: fetch state, query, pagination and
/// the two-step delete.
pub struct EntityTable {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    kind: EntityKind,
    state: TableState,
    query: ListQuery,
    page: usize,
    page_size: usize,
    refresh_count: u64,
    seen_generation: Option<u64>,
    on_refresh: Option<RefreshHook>,
    pending_delete: Option<RecordId>,
    notices: Notices,
}

impl EntityTable {
    pub fn new(backend: Arc<dyn Backend>, cache: QueryCache, kind: EntityKind, page_size: usize) -> Self {
        Self {
            backend,
            cache,
            kind,
            state: TableState::Idle,
            query: ListQuery::default(),
            page: 1,
            page_size: page_size.max(1),
            refresh_count: 0,
            seen_generation: None,
            on_refresh: None,
            pending_delete: None,
            notices: Notices::default(),
        }
    }

    pub fn with_refresh(mut self, hook: RefreshHook) -> Self {
        self.on_refresh = Some(hook);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    pub fn notices(&mut self) -> &mut Notices {
        &mut self.notices
    }

    /// Fetch through the cache. Failures land in `TableState::Failed` with
    /// a message fit for an inline alert.
    pub async fn load(&mut self) -> Result<()> {
        let generation = self.cache.generation(self.kind);
        self.state = TableState::Loading;
        match self.cache.list(self.backend.as_ref(), self.kind).await {
            Ok(records) => {
                tracing::debug!(kind = %self.kind, rows = records.len(), "table loaded");
                self.state = TableState::Loaded(records);
                self.seen_generation = Some(generation);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "table fetch failed");
                self.state = TableState::Failed {
                    message: e.user_message(),
                };
                Err(e)
            }
        }
    }

    pub async fn retry(&mut self) -> Result<()> {
        self.load().await
    }

    /// Drop the cached list and fetch again.
    pub async fn refresh(&mut self) -> Result<()> {
        self.cache.invalidate(self.kind);
        self.refresh_count += 1;
        if let Some(hook) = &self.on_refresh {
            hook();
        }
        self.load().await
    }

    /// Refetch only if something invalidated this kind since the last load.
    /// Returns whether a fetch happened.
    pub async fn sync(&mut self) -> Result<bool> {
        if self.seen_generation == Some(self.cache.generation(self.kind)) {
            return Ok(false);
        }
        self.load().await?;
        Ok(true)
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.query.search = search.into();
        self.page = 1;
    }

    pub fn set_status(&mut self, status: Option<ReviewStatus>) {
        self.query.status = status;
        self.page = 1;
    }

    pub fn set_external_status(&mut self, status: Option<ReviewStatus>) {
        self.query.external_status = status;
        self.page = 1;
    }

    /// Filter on the kind's role field. Ignored for kinds without one.
    pub fn set_role(&mut self, role: Option<&str>) {
        let field = self.kind.descriptor().role_field;
        self.query.role = match (field, role) {
            (Some(field), Some(value)) if !value.trim().is_empty() => Some(FieldFilter {
                field: field.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        };
        self.page = 1;
    }

    pub fn toggle_sort(&mut self, field: &str) {
        self.query.sort = Some(SortState::toggle(self.query.sort.as_ref(), field));
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// The current page of filtered, ordered rows. Empty until loaded.
    pub fn visible(&self) -> Page<'_> {
        let rows = match &self.state {
            TableState::Loaded(records) => list::derive(
                records.as_slice(),
                &self.query,
                self.kind.descriptor().timestamp_fields,
            ),
            _ => Vec::new(),
        };
        list::paginate(rows, self.page, self.page_size)
    }

    /// First step of a delete: stage the id for confirmation.
    pub fn request_delete(&mut self, id: RecordId) -> Result<()> {
        if !self.kind.descriptor().deletable {
            let err = BackofficeError::Unsupported {
                kind: self.kind,
                operation: "Delete",
            };
            self.notices.error(err.user_message());
            return Err(err);
        }
        self.pending_delete = Some(id);
        Ok(())
    }

    pub fn pending_delete(&self) -> Option<&RecordId> {
        self.pending_delete.as_ref()
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    pub async fn confirm_delete(&mut self) -> Result<()> {
        let id = self.pending_delete.take().ok_or(BackofficeError::NotOpen)?;
        let result = self
            .backend
            .delete(self.kind, &id)
            .await
            .and_then(|receipt| receipt.into_result());

        match result {
            Ok(_) => {
                tracing::info!(kind = %self.kind, id = %id, "record deleted");
                self.notices.success(format!("Record {} deleted", id));
                // the list itself reflects the delete; a failed refetch shows inline
                let _ = self.refresh().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, id = %id, error = %e, "delete failed");
                self.notices.error(format!("Delete failed: {}", e.user_message()));
                Err(e)
            }
        }
    }
}
