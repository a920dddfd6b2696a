//! Core value types: log positions, payloads, snapshots and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, totally ordered token identifying one record in a log stream.
///
/// Positions are issued by the stream on append and are used both as replay
/// cursors and as truncation points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogPosition(u64);

impl LogPosition {
    /// The first position of a fresh stream.
    pub const START: LogPosition = LogPosition(0);

    /// Wrap a raw position value.
    pub const fn new(value: u64) -> Self {
        LogPosition(value)
    }

    /// Raw position value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The position immediately after this one.
    pub fn next(&self) -> Self {
        LogPosition(self.0.saturating_add(1))
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogPosition {
    fn from(value: u64) -> Self {
        LogPosition(value)
    }
}

/// Kind tag of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayloadKind {
    /// A batch of state-mutation operations
    Mutation = 1,
    /// A full (deduplicated) snapshot of scheduler state
    Snapshot = 2,
}

impl PayloadKind {
    /// Wire tag for this kind.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PayloadKind::Mutation),
            2 => Some(PayloadKind::Snapshot),
            _ => None,
        }
    }

    /// Name for logging
    pub fn name(&self) -> &'static str {
        match self {
            PayloadKind::Mutation => "mutation",
            PayloadKind::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One logical unit of data to persist.
///
/// Payloads are transient: built per operation, framed, appended and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    kind: PayloadKind,
    data: Vec<u8>,
}

impl Payload {
    /// Create a payload of the given kind.
    pub fn new(kind: PayloadKind, data: Vec<u8>) -> Self {
        Payload { kind, data }
    }

    /// Create a mutation-batch payload.
    pub fn mutation(data: Vec<u8>) -> Self {
        Self::new(PayloadKind::Mutation, data)
    }

    /// Create a snapshot payload.
    pub fn snapshot(data: Vec<u8>) -> Self {
        Self::new(PayloadKind::Snapshot, data)
    }

    /// Payload kind
    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Serialized payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the payload, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Logical size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One sub-record of a full-state snapshot.
///
/// `data` is the unit the snapshot deduplicator fingerprints; many entities
/// typically share byte-identical bodies (e.g. a task configuration template).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Entity key
    pub key: String,
    /// Canonical record body
    pub data: Vec<u8>,
}

impl SnapshotRecord {
    /// Create a record.
    pub fn new(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        SnapshotRecord {
            key: key.into(),
            data: data.into(),
        }
    }
}

/// Point-in-time image of the entire volatile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Records in store order
    pub records: Vec<SnapshotRecord>,
}

impl StateSnapshot {
    /// Create a snapshot from records.
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        StateSnapshot { records }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total bytes across record bodies
    pub fn body_bytes(&self) -> usize {
        self.records.iter().map(|r| r.data.len()).sum()
    }
}

/// Lifecycle of the storage call-order gate.
///
/// ```text
/// NotStarted --start()--> Recovering --replay done--> Ready <--> Snapshotting
///      \______________________\_________________________\___stop()__> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, `start()` not yet called
    NotStarted,
    /// Replaying the log into the volatile store
    Recovering,
    /// Serving writes and snapshot requests
    Ready,
    /// A snapshot cycle is running; writes are still accepted
    Snapshotting,
    /// Shut down; terminal
    Stopped,
}

impl LifecycleState {
    /// Name for logging and errors
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::NotStarted => "NOT_STARTED",
            LifecycleState::Recovering => "RECOVERING",
            LifecycleState::Ready => "READY",
            LifecycleState::Snapshotting => "SNAPSHOTTING",
            LifecycleState::Stopped => "STOPPED",
        }
    }

    /// Whether mutation writes are accepted in this state.
    pub fn accepts_writes(&self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Snapshotting)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
