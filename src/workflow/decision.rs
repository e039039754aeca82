//! Details/decision dialog for one record.
//!
//! The dialog is shared between whatever renders it and the tasks that run
//! its backend calls, so every method takes `&self` and the mutable state
//! sits behind a mutex that is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use super::transition::{apply_transition, available_outcomes, ReviewPolicy, TransitionRequest};
use crate::cache::QueryCache;
use crate::client::Backend;
use crate::errors::{BackofficeError, Result};
use crate::models::{DetailTab, EntityKind, Outcome, Record, RecordId};
use crate::view::table::RefreshHook;

#[derive(Debug, Clone, PartialEq)]
pub enum DialogState {
    Closed,
    Loading,
    Ready(Record),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionTab {
    Overview,
    Detail(DetailTab),
}

impl DecisionTab {
    pub fn title(&self) -> &'static str {
        match self {
            DecisionTab::Overview => "Overview",
            DecisionTab::Detail(tab) => tab.title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionPanel {
    /// Static notice in place of the action buttons.
    AlreadyApproved,
    Outcomes(Vec<Outcome>),
}

/// What the caller should do after a decision went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionEffect {
    Refresh,
    ReloadPage,
}

struct Inner {
    id: Option<RecordId>,
    state: DialogState,
    chosen: Option<Outcome>,
    reason: String,
    reason_invalid: bool,
    submitting: bool,
    error: Option<String>,
}

impl Inner {
    fn closed() -> Self {
        Self {
            id: None,
            state: DialogState::Closed,
            chosen: None,
            reason: String::new(),
            reason_invalid: false,
            submitting: false,
            error: None,
        }
    }
}

fn lock(m: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight flag even if the submitting future is dropped.
/// Leaves the flag alone once the dialog has moved to another record.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
    id: RecordId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        if inner.id.as_ref() == Some(&self.id) {
            inner.submitting = false;
        }
    }
}

pub struct DecisionDialog {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    kind: EntityKind,
    policy: ReviewPolicy,
    on_refresh: Option<RefreshHook>,
    inner: Mutex<Inner>,
}

impl DecisionDialog {
    pub fn new(backend: Arc<dyn Backend>, cache: QueryCache, kind: EntityKind, policy: ReviewPolicy) -> Self {
        Self {
            backend,
            cache,
            kind,
            policy,
            on_refresh: None,
            inner: Mutex::new(Inner::closed()),
        }
    }

    pub fn with_refresh(mut self, hook: RefreshHook) -> Self {
        self.on_refresh = Some(hook);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Point the dialog at a record. `None` closes it; nothing is fetched
    /// until `load` runs.
    pub fn open(&self, id: Option<RecordId>) {
        let mut inner = lock(&self.inner);
        *inner = Inner::closed();
        if let Some(id) = id {
            inner.id = Some(id);
            inner.state = DialogState::Loading;
        }
    }

    pub fn close(&self) {
        *lock(&self.inner) = Inner::closed();
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner).id.is_some()
    }

    pub async fn load(&self) -> Result<()> {
        let id = {
            let mut inner = lock(&self.inner);
            let Some(id) = inner.id.clone() else {
                return Ok(());
            };
            inner.state = DialogState::Loading;
            inner.error = None;
            id
        };

        let result = self.backend.fetch_detail(self.kind, &id).await;

        let mut inner = lock(&self.inner);
        if inner.id.as_ref() != Some(&id) {
            tracing::debug!(kind = %self.kind, id = %id, "discarding detail for a dialog that moved on");
            return Ok(());
        }
        match result {
            Ok(record) => {
                inner.state = DialogState::Ready(record);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, id = %id, error = %e, "detail fetch failed");
                inner.state = DialogState::Failed(e.user_message());
                Err(e)
            }
        }
    }

    pub fn state(&self) -> DialogState {
        lock(&self.inner).state.clone()
    }

    pub fn record(&self) -> Option<Record> {
        match &lock(&self.inner).state {
            DialogState::Ready(record) => Some(record.clone()),
            _ => None,
        }
    }

    /// Overview first, then each detail tab that has something to show.
    pub fn tabs(&self) -> Vec<DecisionTab> {
        let inner = lock(&self.inner);
        let DialogState::Ready(record) = &inner.state else {
            return Vec::new();
        };
        std::iter::once(DecisionTab::Overview)
            .chain(
                self.kind
                    .descriptor()
                    .tabs
                    .iter()
                    .filter(|tab| record.has_content(tab.source_field()))
                    .map(|tab| DecisionTab::Detail(*tab)),
            )
            .collect()
    }

    /// `None` until the record is loaded, and always for kinds that are
    /// not reviewed.
    pub fn panel(&self) -> Option<DecisionPanel> {
        if !self.kind.descriptor().reviewable {
            return None;
        }
        let inner = lock(&self.inner);
        let DialogState::Ready(record) = &inner.state else {
            return None;
        };
        let status = record.effective_status();
        if self.policy.is_terminal(status) {
            Some(DecisionPanel::AlreadyApproved)
        } else {
            Some(DecisionPanel::Outcomes(available_outcomes(status, self.policy)))
        }
    }

    pub fn chosen(&self) -> Option<Outcome> {
        lock(&self.inner).chosen
    }

    /// Whether the reason field is shown.
    pub fn reason_visible(&self) -> bool {
        lock(&self.inner)
            .chosen
            .map(|o| o.requires_reason())
            .unwrap_or(false)
    }

    pub fn set_reason(&self, reason: impl Into<String>) {
        let mut inner = lock(&self.inner);
        inner.reason = reason.into();
        inner.reason_invalid = false;
    }

    pub fn reason_invalid(&self) -> bool {
        lock(&self.inner).reason_invalid
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.inner).error.clone()
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.inner).submitting
    }

    pub fn can_submit(&self) -> bool {
        let inner = lock(&self.inner);
        match inner.chosen {
            None => false,
            Some(_) if inner.submitting => false,
            Some(outcome) => !outcome.requires_reason() || !inner.reason.trim().is_empty(),
        }
    }

    /// Pick an outcome. Approve goes straight to the backend; the others
    /// wait for a reason and an explicit `submit`.
    pub async fn choose(&self, outcome: Outcome) -> Result<Option<DecisionEffect>> {
        {
            let mut inner = lock(&self.inner);
            inner.chosen = Some(outcome);
            inner.reason_invalid = false;
            inner.error = None;
        }
        if outcome.requires_reason() {
            return Ok(None);
        }
        self.submit().await.map(Some)
    }

    pub async fn submit(&self) -> Result<DecisionEffect> {
        let (request, current) = {
            let mut inner = lock(&self.inner);
            if inner.submitting {
                return Err(BackofficeError::Busy);
            }
            let (Some(id), DialogState::Ready(record)) = (inner.id.clone(), &inner.state) else {
                return Err(BackofficeError::NotOpen);
            };
            let current = record.effective_status();
            let Some(outcome) = inner.chosen else {
                return Err(anyhow::anyhow!("no outcome selected").into());
            };
            let request = TransitionRequest::new(id, outcome, Some(inner.reason.clone()));
            if let Err(e) = request.validate() {
                inner.reason_invalid = true;
                return Err(e);
            }
            inner.submitting = true;
            inner.error = None;
            (request, current)
        };

        let result = {
            let _in_flight = InFlight {
                inner: &self.inner,
                id: request.id.clone(),
            };
            apply_transition(
                self.backend.as_ref(),
                &self.cache,
                self.kind,
                Some(current),
                self.policy,
                &request,
            )
            .await
        };

        let still_current = lock(&self.inner).id.as_ref() == Some(&request.id);
        if !still_current {
            tracing::debug!(kind = %self.kind, id = %request.id, "dialog moved on while the decision was in flight");
        }

        match result {
            Ok(_) => {
                if still_current {
                    self.close();
                }
                if let Some(hook) = &self.on_refresh {
                    hook();
                }
                if self.kind.descriptor().reload_after_decision {
                    Ok(DecisionEffect::ReloadPage)
                } else {
                    Ok(DecisionEffect::Refresh)
                }
            }
            Err(e) => {
                if still_current {
                    lock(&self.inner).error = Some(e.user_message());
                }
                Err(e)
            }
        }
    }
}
