//! Reference volatile store: an ordered in-memory key/value map.

use parking_lot::RwLock;
use replog_core::{SnapshotRecord, StateSnapshot, VolatileStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One mutation of a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// Insert or replace a value
    Put {
        /// Entity key
        key: String,
        /// New value
        value: Vec<u8>,
    },
    /// Remove a key if present
    Delete {
        /// Entity key
        key: String,
    },
}

impl StoreOp {
    /// Build a `Put`.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        StoreOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a `Delete`.
    pub fn delete(key: impl Into<String>) -> Self {
        StoreOp::Delete { key: key.into() }
    }
}

/// `BTreeMap`-backed [`VolatileStore`]. Snapshots list entries in key order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry in key order
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl VolatileStore for MemoryStore {
    type Op = StoreOp;

    fn apply(&self, op: &StoreOp) {
        let mut entries = self.entries.write();
        match op {
            StoreOp::Put { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            StoreOp::Delete { key } => {
                entries.remove(key);
            }
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(
            self.entries
                .read()
                .iter()
                .map(|(k, v)| SnapshotRecord::new(k.clone(), v.clone()))
                .collect(),
        )
    }

    fn restore(&self, snapshot: StateSnapshot) {
        let mut entries = self.entries.write();
        entries.clear();
        for record in snapshot.records {
            entries.insert(record.key, record.data);
        }
    }
}
