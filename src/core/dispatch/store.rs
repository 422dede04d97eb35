//! Dispatch record store.
//!
//! One record per distinct function-call identity, created on first sight
//! and never duplicated. The outcome moves from `Pending` to `Sent` or
//! `Failed` exactly once. Records are never removed individually. Each
//! session gets its own store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Relay outcome of a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Relay call in flight
    Pending,
    /// Relay accepted the call
    Sent,
    /// Relay call failed
    Failed,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Pending => write!(f, "pending"),
            DispatchOutcome::Sent => write!(f, "sent"),
            DispatchOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// One dispatched function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Idempotency key
    pub key: String,
    /// Log position of the event carrying the call
    pub seq: u64,
    /// Index of the part carrying the call within its event
    #[serde(default)]
    pub part: usize,
    /// Function name
    pub name: String,
    /// Call arguments
    pub args: BTreeMap<String, String>,
    /// Upstream call id, if the service supplied one
    pub call_id: Option<String>,
    /// When the record was created
    #[serde(with = "time::serde::rfc3339")]
    pub dispatched_at: OffsetDateTime,
    /// When the outcome was recorded
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Current outcome
    pub outcome: DispatchOutcome,
    /// Relay message or failure description
    pub message: Option<String>,
}

#[derive(Default)]
struct StoreInner {
    records: Vec<DispatchRecord>,
    index: HashMap<String, usize>,
}

/// Shared, explicitly owned set of dispatch records.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct DispatchStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for DispatchStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchStore")
            .field("len", &self.len())
            .finish()
    }
}

impl DispatchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its key is already known.
    ///
    /// Returns `false` when the key exists; the existing record is untouched
    /// whatever its outcome.
    pub fn insert_pending(&self, mut record: DispatchRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(&record.key) {
            return false;
        }
        record.outcome = DispatchOutcome::Pending;
        record.completed_at = None;
        let position = inner.records.len();
        inner.index.insert(record.key.clone(), position);
        inner.records.push(record);
        true
    }

    /// Record the outcome of a pending call.
    ///
    /// Returns `false` if the key is unknown or already settled.
    pub fn set_outcome(&self, key: &str, outcome: DispatchOutcome, message: Option<String>) -> bool {
        if outcome == DispatchOutcome::Pending {
            return false;
        }
        let mut inner = self.inner.lock();
        let Some(&position) = inner.index.get(key) else {
            return false;
        };
        let record = &mut inner.records[position];
        if record.outcome != DispatchOutcome::Pending {
            return false;
        }
        record.outcome = outcome;
        record.message = message;
        record.completed_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// Whether a key has been seen.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().index.contains_key(key)
    }

    /// Copy of one record.
    pub fn get(&self, key: &str) -> Option<DispatchRecord> {
        let inner = self.inner.lock();
        inner
            .index
            .get(key)
            .map(|&position| inner.records[position].clone())
    }

    /// Copy of all records in creation order.
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.inner.lock().records.clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records with the given outcome.
    pub fn count(&self, outcome: DispatchOutcome) -> usize {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.outcome == outcome)
            .count()
    }

    /// Forget all records, returning them.
    pub fn reset(&self) -> Vec<DispatchRecord> {
        let mut inner = self.inner.lock();
        inner.index.clear();
        std::mem::take(&mut inner.records)
    }
}
