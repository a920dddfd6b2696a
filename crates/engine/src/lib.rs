//! Storage engine for replog
//!
//! This crate orchestrates the durability layer around a volatile store:
//! - Config: storage settings, loadable from TOML
//! - Log manager: stream manager ownership, truncation, snapshot timer
//! - Storage: write-ahead mutations, snapshots, recovery, bounded shutdown
//! - Call order: lifecycle gate rejecting out-of-order calls
//! - Memory store: reference `VolatileStore` implementation
//!
//! Typical wiring:
//!
//! ```ignore
//! let storage = LogStorage::new(stream, store, LogStorageConfig::default())?;
//! let storage = CallOrderEnforcingStorage::new(storage);
//! storage.start()?;                  // replay, then schedule snapshots
//! storage.write(&[op])?;             // durable before applied
//! storage.stop();                    // bounded by the grace period
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_order;
pub mod config;
pub mod log_manager;
pub mod memory_store;
pub mod storage;

pub use call_order::CallOrderEnforcingStorage;
pub use config::{ConfigError, LogStorageConfig};
pub use log_manager::{LogManager, SchedulerStats, SnapshotScheduler, SnapshotTrigger};
pub use memory_store::{MemoryStore, StoreOp};
pub use storage::{LogStorage, NonVolatileStorage};
