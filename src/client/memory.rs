//! In-memory [`Backend`] with a call log and failure injection. Used by the
//! test suites and by `mineops --offline` demos.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{Backend, MutationReceipt, Payload};
use crate::errors::{BackofficeError, Result};
use crate::models::{EntityKind, Outcome, Record, RecordId, ReviewStatus};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub kind: EntityKind,
    pub id: Option<RecordId>,
    pub outcome: Option<Outcome>,
    pub reason: Option<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<EntityKind, Vec<Record>>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, VecDeque<String>>>,
    next_id: Mutex<u64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn insert(&self, kind: EntityKind, record: Record) {
        lock(&self.records).entry(kind).or_default().push(record);
    }

    pub fn get(&self, kind: EntityKind, id: &RecordId) -> Option<Record> {
        lock(&self.records)
            .get(&kind)
            .and_then(|rows| rows.iter().find(|r| &r.id == id).cloned())
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        lock(&self.records).get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Make the next call to `op` fail with `message`. Reads fail with a
    /// 503; mutations answer `success: false`.
    pub fn fail_next(&self, op: &'static str, message: impl Into<String>) {
        lock(&self.failures)
            .entry(op)
            .or_default()
            .push_back(message.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, op: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    /// Calls that change state on the backend.
    pub fn mutation_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| !c.op.starts_with("fetch"))
            .count()
    }

    fn record_call(
        &self,
        op: &'static str,
        kind: EntityKind,
        id: Option<&RecordId>,
        outcome: Option<Outcome>,
        reason: Option<&str>,
    ) {
        lock(&self.calls).push(Call {
            op,
            kind,
            id: id.cloned(),
            outcome,
            reason: reason.map(str::to_string),
        });
    }

    fn injected_failure(&self, op: &'static str) -> Option<String> {
        lock(&self.failures).get_mut(op).and_then(VecDeque::pop_front)
    }

    fn read_failure(&self, op: &'static str) -> Result<()> {
        match self.injected_failure(op) {
            Some(body) => Err(BackofficeError::Status { status: 503, body }),
            None => Ok(()),
        }
    }

    fn generate_id(&self) -> RecordId {
        let mut next = lock(&self.next_id);
        *next += 1;
        RecordId::from(next.to_string())
    }

    fn with_record<F>(&self, kind: EntityKind, id: &RecordId, f: F) -> MutationReceipt
    where
        F: FnOnce(&mut Record),
    {
        let mut records = lock(&self.records);
        match records
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| &r.id == id))
        {
            Some(record) => {
                f(record);
                MutationReceipt::with_reference(id.to_string())
            }
            None => MutationReceipt::failed(format!("{} {} not found", kind, id)),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.record_call("fetch_list", kind, None, None, None);
        self.read_failure("fetch_list")?;
        Ok(lock(&self.records).get(&kind).cloned().unwrap_or_default())
    }

    async fn fetch_detail(&self, kind: EntityKind, id: &RecordId) -> Result<Record> {
        self.record_call("fetch_detail", kind, Some(id), None, None);
        self.read_failure("fetch_detail")?;
        self.get(kind, id)
            .ok_or_else(|| BackofficeError::NotFound(id.to_string()))
    }

    async fn create(&self, kind: EntityKind, payload: &Payload) -> Result<MutationReceipt> {
        self.record_call("create", kind, None, None, None);
        if let Some(msg) = self.injected_failure("create") {
            return Ok(MutationReceipt::failed(msg));
        }

        let id = self.generate_id();
        let mut record = Record::new(id.clone());
        record.fields = payload.clone();
        record.fields.remove("id");
        if kind.descriptor().reviewable {
            record.status = Some(ReviewStatus::Pending);
        }
        self.insert(kind, record);
        Ok(MutationReceipt::with_reference(id.to_string()))
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &RecordId,
        payload: &Payload,
    ) -> Result<MutationReceipt> {
        self.record_call("update", kind, Some(id), None, None);
        if let Some(msg) = self.injected_failure("update") {
            return Ok(MutationReceipt::failed(msg));
        }
        Ok(self.with_record(kind, id, |record| {
            for (k, v) in payload {
                if k != "id" {
                    record.fields.insert(k.clone(), v.clone());
                }
            }
        }))
    }

    async fn transition_status(
        &self,
        kind: EntityKind,
        id: &RecordId,
        outcome: Outcome,
        reason: Option<&str>,
    ) -> Result<MutationReceipt> {
        self.record_call("transition_status", kind, Some(id), Some(outcome), reason);
        if let Some(msg) = self.injected_failure("transition_status") {
            return Ok(MutationReceipt::failed(msg));
        }
        Ok(self.with_record(kind, id, |record| {
            record.status = Some(outcome.target_status());
            record.reason = reason.map(str::to_string);
        }))
    }

    async fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<MutationReceipt> {
        self.record_call("delete", kind, Some(id), None, None);
        if !kind.descriptor().deletable {
            return Err(BackofficeError::Unsupported {
                kind,
                operation: "Delete",
            });
        }
        if let Some(msg) = self.injected_failure("delete") {
            return Ok(MutationReceipt::failed(msg));
        }
        let mut records = lock(&self.records);
        let rows = records.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        if rows.len() == before {
            return Ok(MutationReceipt::failed(format!("{} {} not found", kind, id)));
        }
        Ok(MutationReceipt::ok())
    }
}

/// Seed data for offline demos.
pub fn demo_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let rows: [(EntityKind, Value); 6] = [
        (
            EntityKind::Miner,
            serde_json::json!({"id": 1, "name": "Tendai", "surname": "Moyo", "nationalId": "63-123456A-12",
                "position": "Foreman", "status": "PENDING", "createdAt": "2024-05-02T09:15:00Z"}),
        ),
        (
            EntityKind::Miner,
            serde_json::json!({"id": 2, "name": "Rudo", "surname": "Chikore", "nationalId": "08-7654321B-45",
                "position": "Driller", "status": "APPROVED", "createdAt": "2024-04-18T13:00:00Z"}),
        ),
        (
            EntityKind::Company,
            serde_json::json!({"id": 10, "companyName": "Shamva Gold Syndicate", "registrationNumber": "RC-2291",
                "address": "Plot 4, Shamva", "status": "PUSHED_BACK", "reason": "Missing tax clearance",
                "documents": ["data:application/pdf;base64,JVBERi0="], "createdAt": "2024-03-30"}),
        ),
        (
            EntityKind::OreReceival,
            serde_json::json!({"id": 42, "oreId": "ORE-0042", "shaftNumbers": "S-3", "weight": 18.4,
                "status": "PENDING", "date": "2024-05-06"}),
        ),
        (
            EntityKind::Vehicle,
            serde_json::json!({"id": 7, "registrationNumber": "AEZ 4411", "make": "Isuzu",
                "vehicleType": "Tipper", "status": "PENDING", "createdAt": "2024-05-01T07:00:00Z"}),
        ),
        (
            EntityKind::Tax,
            serde_json::json!({"id": 3, "taxType": "Royalty", "taxRate": 5, "location": "Mashonaland Central"}),
        ),
    ];
    for (kind, value) in rows {
        match serde_json::from_value::<Record>(value) {
            Ok(record) => backend.insert(kind, record),
            Err(e) => tracing::warn!(kind = %kind, error = %e, "skipping malformed demo row"),
        }
    }
    backend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transition_sets_status_and_reason() {
        let b = MemoryBackend::new();
        b.insert(EntityKind::Driver, Record::new("5").with_status(ReviewStatus::Pending));
        let id = RecordId::from("5");

        b.transition_status(EntityKind::Driver, &id, Outcome::PushBack, Some("Expired licence"))
            .await
            .unwrap()
            .into_result()
            .unwrap();

        let r = b.get(EntityKind::Driver, &id).unwrap();
        assert_eq!(r.status, Some(ReviewStatus::PushedBack));
        assert_eq!(r.reason.as_deref(), Some("Expired licence"));
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_pending() {
        let b = MemoryBackend::new();
        let mut payload = Payload::new();
        payload.insert("registrationNumber".into(), "AEZ 1".into());
        let receipt = b.create(EntityKind::Vehicle, &payload).await.unwrap();
        let id = RecordId::from(receipt.reference.unwrap());
        let r = b.get(EntityKind::Vehicle, &id).unwrap();
        assert_eq!(r.status, Some(ReviewStatus::Pending));
        assert_eq!(r.field_text("registrationNumber").as_deref(), Some("AEZ 1"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_once() {
        let b = MemoryBackend::new();
        b.fail_next("fetch_list", "maintenance");
        assert!(b.fetch_list(EntityKind::Tax).await.is_err());
        assert!(b.fetch_list(EntityKind::Tax).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_unsupported_kind() {
        let b = MemoryBackend::new();
        let err = b.delete(EntityKind::Miner, &RecordId::from("1")).await.unwrap_err();
        assert!(matches!(err, BackofficeError::Unsupported { .. }));
    }

    #[test]
    fn test_demo_backend_is_seeded() {
        let b = demo_backend();
        assert_eq!(b.count(EntityKind::Miner), 2);
        assert_eq!(b.count(EntityKind::OreReceival), 1);
    }
}
