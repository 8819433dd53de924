//! Bounded dead-letter store
//!
//! Operations that fail both the retry phase and every fallback end up here,
//! together with the operation closure itself so they can be replayed through
//! [`RetryExecutor::replay_dead_letter`](super::RetryExecutor::replay_dead_letter).
//! The store holds at most [`DEAD_LETTER_CAPACITY`] entries; an insertion
//! beyond that keeps only the newest [`DEAD_LETTER_RETAIN`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::classify::FailureSnapshot;
use super::config::RetrySettings;
use super::executor::OperationFn;

/// Hard cap on stored dead letters
pub const DEAD_LETTER_CAPACITY: usize = 1_000;

/// Entries kept when the cap is exceeded
pub const DEAD_LETTER_RETAIN: usize = 500;

/// Context recorded alongside a dead letter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterMetadata {
    /// Executor that produced the entry
    pub executor: String,
    /// Retry settings in force when the entry was created
    pub settings: RetrySettings,
    /// Failed replays so far
    pub replay_count: u32,
}

/// Serializable view of a dead letter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// `dlq_` followed by a time-ordered UUID
    pub id: String,
    /// What the failed operation was doing
    pub descriptor: String,
    /// Last error seen for the operation
    pub error: FailureSnapshot,
    /// Attempts made so far, replays included
    pub attempt_count: u32,
    /// When the entry was stored
    pub created_at: DateTime<Utc>,
    /// When the operation last ran
    pub last_attempt_at: DateTime<Utc>,
    /// Executor context
    pub metadata: DeadLetterMetadata,
}

struct DeadLetterEntry<T, E> {
    record: DeadLetterRecord,
    operation: OperationFn<T, E>,
}

/// In-memory dead-letter store of one executor
pub struct DeadLetterStore<T, E> {
    entries: Mutex<Vec<DeadLetterEntry<T, E>>>,
}

impl<T, E> Default for DeadLetterStore<T, E> {
    fn default() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }
}

impl<T, E> fmt::Debug for DeadLetterStore<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadLetterStore").field("len", &self.len()).finish()
    }
}

impl<T, E> DeadLetterStore<T, E> {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a failed operation and return its id
    pub fn add(
        &self,
        descriptor: impl Into<String>,
        operation: OperationFn<T, E>,
        error: FailureSnapshot,
        attempt_count: u32,
        metadata: DeadLetterMetadata,
    ) -> String {
        let now = Utc::now();
        let id = format!("dlq_{}", Uuid::now_v7().simple());
        let record = DeadLetterRecord {
            id: id.clone(),
            descriptor: descriptor.into(),
            error,
            attempt_count,
            created_at: now,
            last_attempt_at: now,
            metadata,
        };

        let mut entries = self.entries.lock();
        entries.push(DeadLetterEntry { record, operation });
        if entries.len() > DEAD_LETTER_CAPACITY {
            let dropped = entries.len() - DEAD_LETTER_RETAIN;
            entries.drain(..dropped);
            debug!(dropped, retained = entries.len(), "Dead-letter store truncated");
        }
        id
    }

    /// Snapshot of all entries in insertion order
    pub fn list(&self) -> Vec<DeadLetterRecord> {
        self.entries.lock().iter().map(|entry| entry.record.clone()).collect()
    }

    /// Snapshot of entry `id`
    pub fn get(&self, id: &str) -> Option<DeadLetterRecord> {
        self.entries.lock().iter().find(|entry| entry.record.id == id).map(|e| e.record.clone())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry and return how many were removed
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.entries.lock()).len();
        info!(removed, "Dead-letter store cleared");
        removed
    }

    /// Remove entry `id`; returns whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.record.id != id);
        entries.len() != before
    }

    /// Descriptor and retained operation of entry `id`
    pub(crate) fn operation(&self, id: &str) -> Option<(String, OperationFn<T, E>)> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.record.id == id)
            .map(|entry| (entry.record.descriptor.clone(), Arc::clone(&entry.operation)))
    }

    /// Update entry `id` after a replay that failed again
    pub(crate) fn record_failed_replay(&self, id: &str, attempts: u32, error: FailureSnapshot) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.record.id == id) {
            let record = &mut entry.record;
            record.attempt_count = record.attempt_count.saturating_add(attempts);
            record.last_attempt_at = Utc::now();
            record.error = error;
            record.metadata.replay_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::FutureExt;

    use super::*;

    type Store = DeadLetterStore<u32, String>;

    fn op() -> OperationFn<u32, String> {
        Arc::new(|| async { Err::<u32, String>("ECONNRESET".to_string()) }.boxed())
    }

    fn snapshot(message: &str) -> FailureSnapshot {
        FailureSnapshot { kind: "Error".into(), message: message.into(), code: None }
    }

    fn metadata() -> DeadLetterMetadata {
        DeadLetterMetadata {
            executor: "billing".into(),
            settings: RetrySettings::default(),
            replay_count: 0,
        }
    }

    #[test]
    fn test_add_list_get_remove() {
        let store = Store::new();
        let id = store.add("charge #1", op(), snapshot("boom"), 3, metadata());

        assert!(id.starts_with("dlq_"));
        assert_eq!(store.len(), 1);

        let record = store.get(&id).expect("entry exists");
        assert_eq!(record.descriptor, "charge #1");
        assert_eq!(record.attempt_count, 3);
        assert_eq!(record.created_at, record.last_attempt_at);
        assert_eq!(record.metadata.executor, "billing");

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }

    /// Validates ids are unique and entries keep insertion order.
    #[test]
    fn test_insertion_order_and_unique_ids() {
        let store = Store::new();
        let first = store.add("a", op(), snapshot("1"), 1, metadata());
        let second = store.add("b", op(), snapshot("2"), 1, metadata());

        assert_ne!(first, second);
        let ids: Vec<_> = store.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    /// Validates overflow truncation keeps the newest entries.
    ///
    /// Assertions:
    /// - 1000 entries are kept as-is.
    /// - The 1001st insertion leaves exactly the newest 500.
    #[test]
    fn test_capacity_truncates_to_newest() {
        let store = Store::new();
        for i in 0..DEAD_LETTER_CAPACITY {
            store.add(format!("op-{i}"), op(), snapshot("x"), 1, metadata());
        }
        assert_eq!(store.len(), DEAD_LETTER_CAPACITY);

        store.add("op-1000", op(), snapshot("x"), 1, metadata());

        let records = store.list();
        assert_eq!(records.len(), DEAD_LETTER_RETAIN);
        assert_eq!(records.first().unwrap().descriptor, "op-501");
        assert_eq!(records.last().unwrap().descriptor, "op-1000");
    }

    #[test]
    fn test_clear_returns_count() {
        let store = Store::new();
        store.add("a", op(), snapshot("1"), 1, metadata());
        store.add("b", op(), snapshot("2"), 1, metadata());

        assert_eq!(store.clear(), 2);
        assert_eq!(store.clear(), 0);
    }

    #[test]
    fn test_failed_replay_updates_entry() {
        let store = Store::new();
        let id = store.add("a", op(), snapshot("first"), 3, metadata());

        store.record_failed_replay(&id, 2, snapshot("second"));

        let record = store.get(&id).unwrap();
        assert_eq!(record.attempt_count, 5);
        assert_eq!(record.error.message, "second");
        assert_eq!(record.metadata.replay_count, 1);
        assert!(record.last_attempt_at >= record.created_at);
    }

    #[tokio::test]
    async fn test_operation_is_retained() {
        let store = Store::new();
        let id = store.add("a", op(), snapshot("x"), 1, metadata());

        let (descriptor, operation) = store.operation(&id).expect("entry exists");
        assert_eq!(descriptor, "a");
        assert_eq!(operation().await, Err("ECONNRESET".to_string()));
        assert!(store.operation("dlq_missing").is_none());
    }
}
