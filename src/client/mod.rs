pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{BackofficeError, Result};
use crate::models::{EntityKind, Outcome, Record, RecordId};

pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// Body sent on create/update: the collected form values.
pub type Payload = Map<String, Value>;

/// Backend answer to a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationReceipt {
    pub success: bool,
    pub error: Option<String>,
    /// Reference number or id handed back on create, shown on confirmation.
    pub reference: Option<String>,
}

impl MutationReceipt {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            reference: None,
        }
    }

    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            reference: None,
        }
    }

    /// Interpret a response body. Bodies without a `success` flag count as
    /// success; the reference is taken from the first id-like key present.
    pub fn from_body(body: &Value) -> Self {
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(true);
        let error = if success {
            None
        } else {
            ["error", "message"]
                .iter()
                .find_map(|k| body.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };
        let data = body.get("data").unwrap_or(body);
        let reference = ["reference", "referenceNumber", "oreId", "id", "_id"]
            .iter()
            .find_map(|k| match data.get(*k) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });
        Self {
            success,
            error,
            reference,
        }
    }

    /// Turn a `success: false` answer into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(BackofficeError::Mutation(
                self.error
                    .unwrap_or_else(|| "The request was not accepted.".to_string()),
            ))
        }
    }
}

/// The REST collaborator every view talks to.
///
/// Mutations may answer `Ok` with `success == false`; callers run
/// [`MutationReceipt::into_result`] to surface that as an error.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_list(&self, kind: EntityKind) -> Result<Vec<Record>>;

    async fn fetch_detail(&self, kind: EntityKind, id: &RecordId) -> Result<Record>;

    async fn create(&self, kind: EntityKind, payload: &Payload) -> Result<MutationReceipt>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &RecordId,
        payload: &Payload,
    ) -> Result<MutationReceipt>;

    /// Apply a reviewer decision. `reason` is `None` for approve.
    async fn transition_status(
        &self,
        kind: EntityKind,
        id: &RecordId,
        outcome: Outcome,
        reason: Option<&str>,
    ) -> Result<MutationReceipt>;

    async fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<MutationReceipt>;
}
