//! External capabilities consumed by the engine.
//!
//! The engine depends on two narrow interfaces instead of concrete
//! collaborators: an append-only [`LogStream`] and a [`VolatileStore`] that
//! holds live scheduler state. Neither knows about the other.

use crate::error::LogStreamError;
use crate::types::{LogPosition, StateSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One record read back from a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position the stream assigned on append
    pub position: LogPosition,
    /// Record bytes exactly as appended
    pub data: Vec<u8>,
}

/// Lazy iterator over log records in position order.
pub type LogRecordIter = Box<dyn Iterator<Item = Result<LogRecord, LogStreamError>> + Send>;

/// Append-only, position-ordered log.
///
/// Replication, leadership and the transport's own wire format live behind
/// this trait. Implementations must expose a clean append boundary: a record
/// is either fully readable after `append` returns or not present at all.
pub trait LogStream: Send + Sync {
    /// Append one record, returning its position.
    ///
    /// Blocks until the stream acknowledges the write.
    fn append(&self, data: &[u8]) -> Result<LogPosition, LogStreamError>;

    /// Read records with position `>= from`, in order.
    ///
    /// The iterator is finite: it ends at the last record present when it
    /// reaches the end of the stream.
    fn read_from(&self, from: LogPosition) -> Result<LogRecordIter, LogStreamError>;

    /// Discard every record with position `< position`.
    fn truncate_before(&self, position: LogPosition) -> Result<(), LogStreamError>;

    /// Position of the oldest retained record (or the next position if empty).
    fn first_position(&self) -> LogPosition;

    /// Position the next append will receive.
    fn next_position(&self) -> LogPosition;
}

/// In-memory store of live scheduler state.
///
/// All methods take `&self`; implementations synchronize internally.
pub trait VolatileStore: Send + Sync {
    /// A single state-mutation operation.
    type Op: Serialize + DeserializeOwned + Send + Sync;

    /// Apply one mutation.
    fn apply(&self, op: &Self::Op);

    /// Capture a consistent image of the entire state.
    fn snapshot(&self) -> StateSnapshot;

    /// Replace the entire state with `snapshot`.
    fn restore(&self, snapshot: StateSnapshot);
}
