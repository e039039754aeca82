//! The review protocol shared by every reviewable entity.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED
//!    │──reject───────▶ REJECTED     (reason required)
//!    └──push back────▶ PUSHED_BACK  (reason required)
//! ```
//!
//! Transitions are only ever triggered by a reviewer. REJECTED and
//! PUSHED_BACK records stay open to a new decision; APPROVED is closed
//! unless the policy says otherwise.

use serde::{Deserialize, Serialize};

use crate::cache::QueryCache;
use crate::client::Backend;
use crate::errors::{BackofficeError, Result};
use crate::models::{EntityKind, Outcome, RecordId, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    pub approved_is_terminal: bool,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            approved_is_terminal: true,
        }
    }
}

impl ReviewPolicy {
    pub fn is_terminal(&self, status: ReviewStatus) -> bool {
        status == ReviewStatus::Approved && self.approved_is_terminal
    }
}

/// Outcomes a reviewer may pick for a record currently in `status`.
pub fn available_outcomes(status: ReviewStatus, policy: ReviewPolicy) -> Vec<Outcome> {
    if policy.is_terminal(status) {
        Vec::new()
    } else {
        Outcome::ALL.to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub id: RecordId,
    pub outcome: Outcome,
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(id: impl Into<RecordId>, outcome: Outcome, reason: Option<String>) -> Self {
        Self {
            id: id.into(),
            outcome,
            reason,
        }
    }

    /// Reason as it should be sent: trimmed, and dropped entirely for
    /// outcomes that don't take one.
    pub fn wire_reason(&self) -> Option<&str> {
        if !self.outcome.requires_reason() {
            return None;
        }
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.outcome.requires_reason() && self.wire_reason().is_none() {
            return Err(BackofficeError::ReasonRequired(self.outcome.verb()));
        }
        Ok(())
    }
}

/// Validate and submit a decision, then invalidate every list that shows the
/// record. `current` is the status the reviewer saw, when known.
pub async fn apply_transition(
    backend: &dyn Backend,
    cache: &QueryCache,
    kind: EntityKind,
    current: Option<ReviewStatus>,
    policy: ReviewPolicy,
    request: &TransitionRequest,
) -> Result<ReviewStatus> {
    if !kind.descriptor().reviewable {
        return Err(BackofficeError::Unsupported {
            kind,
            operation: "Review",
        });
    }
    request.validate()?;
    if current.map(|s| policy.is_terminal(s)).unwrap_or(false) {
        return Err(BackofficeError::AlreadyApproved);
    }

    backend
        .transition_status(kind, &request.id, request.outcome, request.wire_reason())
        .await?
        .into_result()?;

    let status = request.outcome.target_status();
    tracing::info!(
        kind = %kind,
        id = %request.id,
        outcome = %request.outcome,
        status = %status,
        "decision recorded"
    );
    cache.invalidate(kind);
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryBackend;
    use crate::models::Record;
    use std::time::Duration;

    fn setup() -> (MemoryBackend, QueryCache) {
        let b = MemoryBackend::new();
        b.insert(EntityKind::OreReceival, Record::new("42").with_status(ReviewStatus::Pending));
        (b, QueryCache::new(Duration::from_secs(60)))
    }

    #[test]
    fn test_outcomes_offered_unless_approved() {
        let policy = ReviewPolicy::default();
        for status in [ReviewStatus::Pending, ReviewStatus::Rejected, ReviewStatus::PushedBack] {
            assert_eq!(available_outcomes(status, policy).len(), 3);
        }
        assert!(available_outcomes(ReviewStatus::Approved, policy).is_empty());
    }

    #[test]
    fn test_approved_reopens_when_policy_allows() {
        let policy = ReviewPolicy {
            approved_is_terminal: false,
        };
        assert_eq!(available_outcomes(ReviewStatus::Approved, policy).len(), 3);
    }

    #[test]
    fn test_blank_reason_rejected() {
        let req = TransitionRequest::new("1", Outcome::Reject, Some("   ".into()));
        assert!(matches!(req.validate(), Err(BackofficeError::ReasonRequired("reject"))));
        let req = TransitionRequest::new("1", Outcome::PushBack, None);
        assert!(matches!(req.validate(), Err(BackofficeError::ReasonRequired("push back"))));
    }

    #[test]
    fn test_approve_never_needs_or_sends_reason() {
        let req = TransitionRequest::new("1", Outcome::Approve, Some("leftover text".into()));
        assert!(req.validate().is_ok());
        assert_eq!(req.wire_reason(), None);
        assert!(TransitionRequest::new("1", Outcome::Approve, None).validate().is_ok());
    }

    #[tokio::test]
    async fn test_reject_calls_backend_with_exact_arguments() {
        let (b, cache) = setup();
        let req = TransitionRequest::new("42", Outcome::Reject, Some("Damaged load".into()));
        let status = apply_transition(
            &b,
            &cache,
            EntityKind::OreReceival,
            Some(ReviewStatus::Pending),
            ReviewPolicy::default(),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(status, ReviewStatus::Rejected);
        let calls = b.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, Some(RecordId::from("42")));
        assert_eq!(calls[0].outcome, Some(Outcome::Reject));
        assert_eq!(calls[0].reason.as_deref(), Some("Damaged load"));
        assert_eq!(cache.generation(EntityKind::OreReceival), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_call() {
        let (b, cache) = setup();
        let req = TransitionRequest::new("42", Outcome::PushBack, Some(String::new()));
        let res = apply_transition(&b, &cache, EntityKind::OreReceival, None, ReviewPolicy::default(), &req).await;
        assert!(res.is_err());
        assert_eq!(b.mutation_count(), 0);
        assert_eq!(cache.generation(EntityKind::OreReceival), 0);
    }

    #[tokio::test]
    async fn test_terminal_record_refused() {
        let (b, cache) = setup();
        let req = TransitionRequest::new("42", Outcome::Reject, Some("late".into()));
        let res = apply_transition(
            &b,
            &cache,
            EntityKind::OreReceival,
            Some(ReviewStatus::Approved),
            ReviewPolicy::default(),
            &req,
        )
        .await;
        assert!(matches!(res, Err(BackofficeError::AlreadyApproved)));
        assert_eq!(b.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_non_reviewable_kind_refused() {
        let (b, cache) = setup();
        let req = TransitionRequest::new("1", Outcome::Approve, None);
        let res = apply_transition(&b, &cache, EntityKind::Tax, None, ReviewPolicy::default(), &req).await;
        assert!(matches!(res, Err(BackofficeError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn test_backend_refusal_surfaces_and_keeps_cache() {
        let (b, cache) = setup();
        b.fail_next("transition_status", "Record locked by another reviewer");
        let req = TransitionRequest::new("42", Outcome::Approve, None);
        let err = apply_transition(&b, &cache, EntityKind::OreReceival, None, ReviewPolicy::default(), &req)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Record locked by another reviewer");
        assert_eq!(cache.generation(EntityKind::OreReceival), 0);
    }
}
