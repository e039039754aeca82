use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review state carried by every reviewable record.
///
/// Records are created by the backend in `Pending`; the other three states
/// are reached only through an explicit reviewer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    PushedBack,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Pending,
        ReviewStatus::Approved,
        ReviewStatus::Rejected,
        ReviewStatus::PushedBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::PushedBack => "PUSHED_BACK",
        }
    }

    /// Human-readable badge text.
    pub fn label(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "Pending",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Rejected => "Rejected",
            ReviewStatus::PushedBack => "Pushed back",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "pushedback" | "pushback" => Ok(ReviewStatus::PushedBack),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// A reviewer decision. Each outcome maps to exactly one target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Approve,
    PushBack,
    Reject,
}

impl Outcome {
    /// Button order used by the decision panel.
    pub const ALL: [Outcome; 3] = [Outcome::Approve, Outcome::PushBack, Outcome::Reject];

    pub fn target_status(&self) -> ReviewStatus {
        match self {
            Outcome::Approve => ReviewStatus::Approved,
            Outcome::PushBack => ReviewStatus::PushedBack,
            Outcome::Reject => ReviewStatus::Rejected,
        }
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, Outcome::PushBack | Outcome::Reject)
    }

    /// Wire name, as passed to the backend (`approve`, `reject`, `pushBack`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Approve => "approve",
            Outcome::PushBack => "pushBack",
            Outcome::Reject => "reject",
        }
    }

    /// Path segment used by the REST routes.
    pub fn route_segment(&self) -> &'static str {
        match self {
            Outcome::Approve => "approve",
            Outcome::PushBack => "push-back",
            Outcome::Reject => "reject",
        }
    }

    /// Verb phrase for messages ("a reason is required to reject").
    pub fn verb(&self) -> &'static str {
        match self {
            Outcome::Approve => "approve",
            Outcome::PushBack => "push back",
            Outcome::Reject => "reject",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
