//! replog - durable, crash-recoverable storage for cluster scheduler state
//!
//! replog persists a scheduler's in-memory state on an append-only log:
//! mutation batches are logged before they are applied, full-state snapshots
//! compact the log, and a restart replays snapshot plus later mutations.
//!
//! # Quick Start
//!
//! ```ignore
//! use replog::{
//!     CallOrderEnforcingStorage, FileLogStream, LogStorage, LogStorageConfig, MemoryStore,
//!     NonVolatileStorage, StoreOp,
//! };
//! use std::sync::Arc;
//!
//! let stream = Arc::new(FileLogStream::open("scheduler.log")?);
//! let store = Arc::new(MemoryStore::new());
//! let storage = CallOrderEnforcingStorage::new(LogStorage::new(
//!     stream,
//!     Arc::clone(&store),
//!     LogStorageConfig::default(),
//! )?);
//!
//! storage.start()?;
//! storage.write(&[StoreOp::put("job/web/0", b"{...}".to_vec())])?;
//! storage.snapshot()?;
//! storage.stop();
//! ```
//!
//! # Architecture
//!
//! - `replog-core`: positions, payloads, errors and the `LogStream` /
//!   `VolatileStore` capability traits
//! - `replog-durability`: framing, digests, snapshot deduplication, replay,
//!   and the memory and file log streams
//! - `replog-engine`: configuration, snapshot scheduling, the lifecycle gate
//!   and the storage orchestration

pub use replog_core::{
    Error, LifecycleState, LogPosition, LogRecord, LogStream, LogStreamError, Payload,
    PayloadKind, Result, SnapshotRecord, StateSnapshot, VolatileStore,
};
pub use replog_durability::{
    DeduplicatedSnapshot, DigestAlgorithm, EntryCodec, FileLogStream, MemoryLogStream,
    ReplayStats, SnapshotDeduplicator, StreamConfig, StreamManager,
};
pub use replog_engine::{
    CallOrderEnforcingStorage, ConfigError, LogManager, LogStorage, LogStorageConfig, MemoryStore,
    NonVolatileStorage, SnapshotTrigger, StoreOp,
};
