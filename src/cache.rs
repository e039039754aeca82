use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::Backend;
use crate::errors::Result;
use crate::models::{EntityKind, Record};

/// Entry stored per entity kind with an expiry timestamp.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    records: Arc<Vec<Record>>,
    pub(crate) expires_at: Instant,
}

/// List cache shared by every table and dialog of one session.
///
/// Lists are fetched on first use and kept until their TTL runs out or a
/// mutation invalidates them. Each kind carries a generation counter that
/// moves on every invalidation; views compare it to decide whether their
/// copy is stale.
#[derive(Clone)]
pub struct QueryCache {
    pub(crate) entries: Arc<DashMap<EntityKind, CacheEntry>>,
    generations: Arc<DashMap<EntityKind, u64>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Cached list for `kind` if still fresh.
    pub fn get(&self, kind: EntityKind) -> Option<Arc<Vec<Record>>> {
        if let Some(entry) = self.entries.get(&kind) {
            if Instant::now() < entry.expires_at {
                return Some(entry.records.clone());
            }
        }
        // re-checked under the write lock: a concurrent fetch may have
        // stored a fresh list since the read above
        self.entries
            .remove_if(&kind, |_, entry| Instant::now() >= entry.expires_at);
        None
    }

    /// Return the cached list or fetch it from the backend.
    pub async fn list(&self, backend: &dyn Backend, kind: EntityKind) -> Result<Arc<Vec<Record>>> {
        if let Some(records) = self.get(kind) {
            tracing::trace!(kind = %kind, "list cache hit");
            return Ok(records);
        }

        let generation = self.generation(kind);
        let records = Arc::new(backend.fetch_list(kind).await?);

        // an invalidation raced the fetch; hand the rows out but don't keep them
        if self.generation(kind) == generation {
            self.entries.insert(
                kind,
                CacheEntry {
                    records: records.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        tracing::debug!(kind = %kind, rows = records.len(), "list fetched");
        Ok(records)
    }

    pub fn generation(&self, kind: EntityKind) -> u64 {
        self.generations.get(&kind).map(|g| *g).unwrap_or(0)
    }

    /// Drop `kind` and every list that depends on it. Returns the kinds
    /// that were invalidated.
    pub fn invalidate(&self, kind: EntityKind) -> Vec<EntityKind> {
        let mut seen = HashSet::new();
        let mut pending = vec![kind];
        let mut order = Vec::new();

        while let Some(next) = pending.pop() {
            if !seen.insert(next) {
                continue;
            }
            self.entries.remove(&next);
            *self.generations.entry(next).or_insert(0) += 1;
            order.push(next);
            pending.extend(next.descriptor().invalidates.iter().copied());
        }

        tracing::debug!(kind = %kind, invalidated = ?order, "list cache invalidated");
        order
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
