//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use replog::{
    CallOrderEnforcingStorage, Error, FileLogStream, LifecycleState, LogPosition, LogStorage,
    LogStorageConfig, LogStream, MemoryLogStream, MemoryStore, NonVolatileStorage, StoreOp,
};
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Testing config with the timer pushed out of the way.
pub fn quiet_config() -> LogStorageConfig {
    LogStorageConfig::for_testing().with_snapshot_interval(Duration::from_secs(3600))
}

/// Gated storage over the in-memory store.
pub type Storage = CallOrderEnforcingStorage<LogStorage<MemoryStore>>;

/// Build (but do not start) gated storage on `stream`.
pub fn build_storage(stream: Arc<dyn LogStream>, config: LogStorageConfig) -> Arc<Storage> {
    let storage = LogStorage::new(stream, Arc::new(MemoryStore::new()), config)
        .expect("valid test config");
    CallOrderEnforcingStorage::new(storage)
}

// ============================================================================
// TestStorage - storage over a shared in-memory log
// ============================================================================

/// Storage wrapper whose log survives restarts.
pub struct TestStorage {
    pub log: MemoryLogStream,
    pub config: LogStorageConfig,
    pub storage: Arc<Storage>,
}

impl TestStorage {
    /// Create and start storage on a fresh log.
    pub fn new() -> Self {
        Self::with_config(quiet_config())
    }

    /// Create and start storage on a fresh log with `config`.
    pub fn with_config(config: LogStorageConfig) -> Self {
        init_tracing();
        let log = MemoryLogStream::new();
        let storage = build_storage(Arc::new(log.clone()), config.clone());
        storage.start().expect("recovery of an empty log");
        TestStorage {
            log,
            config,
            storage,
        }
    }

    /// Create storage on a fresh log without starting it.
    pub fn unstarted() -> Self {
        init_tracing();
        let log = MemoryLogStream::new();
        let config = quiet_config();
        let storage = build_storage(Arc::new(log.clone()), config.clone());
        TestStorage {
            log,
            config,
            storage,
        }
    }

    /// The live volatile store
    pub fn store(&self) -> &Arc<MemoryStore> {
        self.storage.inner().store()
    }

    /// Graceful restart: stop, then recover a new instance from the log.
    pub fn restart(&mut self) {
        self.storage.stop();
        self.crash_and_recover();
    }

    /// Simulated crash: abandon the instance without `stop()` and recover a
    /// new one from the log.
    pub fn crash_and_recover(&mut self) {
        self.storage = build_storage(Arc::new(self.log.clone()), self.config.clone());
        self.storage.start().expect("recovery");
    }

    /// Write one `Put`.
    pub fn put(&self, key: &str, value: &[u8]) -> LogPosition {
        self.storage
            .write(&[StoreOp::put(key, value.to_vec())])
            .expect("write")
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Sorted entries of a store, for comparisons.
pub fn entries(store: &MemoryStore) -> Vec<(String, Vec<u8>)> {
    store.entries()
}

/// Spin until `condition` holds or `timeout` passes. Returns whether it held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Current size of a file in bytes.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).expect("file metadata").len()
}

/// Append raw bytes to a file.
pub fn append_bytes(path: &Path, bytes: &[u8]) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for append");
    file.write_all(bytes).expect("append");
}
