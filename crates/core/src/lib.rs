//! Core types and traits for replog
//!
//! This crate defines the foundational types shared by the durability and
//! engine layers:
//! - LogPosition: opaque, totally ordered token issued by a log stream
//! - Payload / PayloadKind: one logical unit to persist (mutation batch or snapshot)
//! - StateSnapshot / SnapshotRecord: full-state image of the volatile store
//! - LifecycleState: states of the call-order gate
//! - Error: error type hierarchy
//! - Traits: external capabilities (LogStream, VolatileStore)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, LogStreamError, Result};
pub use traits::{LogRecord, LogRecordIter, LogStream, VolatileStore};
pub use types::{
    LifecycleState, LogPosition, Payload, PayloadKind, SnapshotRecord, StateSnapshot,
};
