//! Log-backed durable storage.
//!
//! [`LogStorage`] keeps a [`VolatileStore`] recoverable from a log stream:
//!
//! - **start**: replay the log from the oldest retained record, applying
//!   mutation batches and restoring snapshots in log order
//! - **write**: append the mutation batch first, then apply it to the store
//! - **snapshot**: capture the store, deduplicate, append, then truncate the
//!   log before the snapshot
//! - **stop**: cancel the timer, give in-flight snapshot work a bounded grace
//!   period, then close the stream
//!
//! ## Ordering
//!
//! Mutation writes hold the apply lock across append and apply; snapshots
//! hold it across capture and append. Every mutation is therefore either
//! reflected in a snapshot and logged before it, or logged after it, so a
//! replay of "snapshot, then later mutations" reproduces the store.
//!
//! This type does not police call order. Wrap it in
//! [`CallOrderEnforcingStorage`](crate::CallOrderEnforcingStorage).

use crate::config::LogStorageConfig;
use crate::log_manager::{LogManager, SnapshotTrigger};
use parking_lot::{Condvar, Mutex};
use replog_core::{
    Error, LogPosition, LogStream, Payload, PayloadKind, Result, VolatileStore,
};
use replog_durability::{DeduplicatedSnapshot, ReplayStats, SnapshotDeduplicator};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Durable storage lifecycle operations.
pub trait NonVolatileStorage: Send + Sync {
    /// Mutation operation type
    type Op;

    /// Recover state from durable storage.
    fn start(&self) -> Result<()>;

    /// Durably record a batch of mutations and apply it. Returns the
    /// position of the batch in the log.
    fn write(&self, batch: &[Self::Op]) -> Result<LogPosition>;

    /// Persist a full snapshot. Returns its position in the log.
    fn snapshot(&self) -> Result<LogPosition>;

    /// Shut down. Never fails; bounded by the configured grace period.
    fn stop(&self);

    /// Called once recovery has completed and the storage is serving.
    fn on_ready(&self, _trigger: Weak<dyn SnapshotTrigger>) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// In-flight snapshot tracking
// ============================================================================

/// Counts in-flight snapshot cycles so shutdown can wait for them.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        *self.count.lock() += 1;
        InFlightGuard { tracker: self }
    }

    fn active(&self) -> usize {
        *self.count.lock()
    }

    /// Wait until no cycle is in flight. Returns false on timeout.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.drained.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// RAII guard for one in-flight cycle.
struct InFlightGuard<'a> {
    tracker: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.tracker.count.lock();
        *count -= 1;
        if *count == 0 {
            self.tracker.drained.notify_all();
        }
    }
}

// ============================================================================
// LogStorage
// ============================================================================

/// Log-backed storage for a volatile store.
pub struct LogStorage<S: VolatileStore> {
    store: Arc<S>,
    log: LogManager,
    dedup: SnapshotDeduplicator,
    config: LogStorageConfig,
    apply_lock: Mutex<()>,
    /// Position of the last payload applied to the store
    applied: Mutex<Option<LogPosition>>,
    last_replay: Mutex<Option<ReplayStats>>,
    snapshots: InFlight,
}

impl<S: VolatileStore> LogStorage<S> {
    /// Create storage for `store` persisted in `stream`.
    ///
    /// Fails with `Error::Config` if `config` does not validate.
    pub fn new(stream: Arc<dyn LogStream>, store: Arc<S>, config: LogStorageConfig) -> Result<Self> {
        let log = LogManager::open(stream, &config)?;
        Ok(LogStorage {
            store,
            log,
            dedup: SnapshotDeduplicator::new(),
            config,
            apply_lock: Mutex::new(()),
            applied: Mutex::new(None),
            last_replay: Mutex::new(None),
            snapshots: InFlight::default(),
        })
    }

    /// The volatile store kept by this storage
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Log manager in use
    pub fn log(&self) -> &LogManager {
        &self.log
    }

    /// Active configuration
    pub fn config(&self) -> &LogStorageConfig {
        &self.config
    }

    /// Position of the last payload applied to the store, if any.
    pub fn recovered_position(&self) -> Option<LogPosition> {
        *self.applied.lock()
    }

    /// Counters from the most recent replay
    pub fn last_replay_stats(&self) -> Option<ReplayStats> {
        self.last_replay.lock().clone()
    }

    /// Number of snapshot cycles currently running
    pub fn snapshots_in_flight(&self) -> usize {
        self.snapshots.active()
    }

    fn apply_payload(&self, position: LogPosition, payload: Payload) -> Result<()> {
        match payload.kind() {
            PayloadKind::Mutation => {
                let batch: Vec<S::Op> = bincode::deserialize(payload.data()).map_err(|e| {
                    Error::corruption(format!(
                        "undecodable mutation batch at position {}: {}",
                        position, e
                    ))
                })?;
                for op in &batch {
                    self.store.apply(op);
                }
            }
            PayloadKind::Snapshot => {
                let reduced = DeduplicatedSnapshot::from_bytes(payload.data())?;
                let snapshot = self.dedup.restore(reduced)?;
                debug!(
                    target: "replog::storage",
                    position = position.value(),
                    records = snapshot.len(),
                    "Restoring snapshot"
                );
                self.store.restore(snapshot);
            }
        }
        *self.applied.lock() = Some(position);
        Ok(())
    }
}

impl<S: VolatileStore> NonVolatileStorage for LogStorage<S> {
    type Op = S::Op;

    fn start(&self) -> Result<()> {
        let started = Instant::now();
        let from = self.log.recovery_start();
        info!(target: "replog::storage", from = from.value(), "Recovering from log");

        let _apply = self.apply_lock.lock();
        let mut replay = self.log.stream_manager().replay_from(from)?;
        let mut outcome = Ok(());
        for item in replay.by_ref() {
            match item.and_then(|r| self.apply_payload(r.position, r.payload)) {
                Ok(()) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let stats = replay.stats().clone();
        *self.last_replay.lock() = Some(stats.clone());
        outcome?;

        info!(
            target: "replog::storage",
            payloads = stats.payloads,
            mutations = stats.mutations,
            snapshots = stats.snapshots,
            frames = stats.frames,
            abandoned_runs = stats.abandoned_runs,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recovery complete"
        );
        Ok(())
    }

    fn write(&self, batch: &[S::Op]) -> Result<LogPosition> {
        let data = bincode::serialize(batch)?;

        let _apply = self.apply_lock.lock();
        let position = self.log.stream_manager().append(&Payload::mutation(data))?;
        for op in batch {
            self.store.apply(op);
        }
        *self.applied.lock() = Some(position);
        Ok(position)
    }

    fn snapshot(&self) -> Result<LogPosition> {
        let _in_flight = self.snapshots.enter();
        let started = Instant::now();

        let (position, records, stats, bytes) = {
            let _apply = self.apply_lock.lock();
            let image = self.store.snapshot();
            let records = image.len();
            let reduced = self.dedup.reduce(image);
            let stats = reduced.stats();
            let data = reduced.to_bytes()?;
            let bytes = data.len();
            let position = self.log.stream_manager().append(&Payload::snapshot(data))?;
            *self.applied.lock() = Some(position);
            (position, records, stats, bytes)
        };

        // The snapshot is durable; failing to reclaim space is not fatal.
        if let Err(e) = self.log.truncate_before(position) {
            warn!(
                target: "replog::storage",
                position = position.value(),
                error = %e,
                "Failed to truncate log after snapshot"
            );
        }

        info!(
            target: "replog::storage",
            position = position.value(),
            records,
            references = stats.references,
            bytes,
            bytes_saved = stats.bytes_saved,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snapshot complete"
        );
        Ok(position)
    }

    fn stop(&self) {
        self.log.cancel();

        let grace = self.config.shutdown_grace_period();
        if !self.snapshots.wait_idle(grace) {
            warn!(
                target: "replog::storage",
                in_flight = self.snapshots.active(),
                grace_ms = grace.as_millis() as u64,
                "Grace period expired, abandoning in-flight snapshot"
            );
        }

        self.log.stream_manager().close();
        info!(target: "replog::storage", "Storage stopped");
    }

    fn on_ready(&self, trigger: Weak<dyn SnapshotTrigger>) -> Result<()> {
        self.log
            .schedule_snapshots(self.config.snapshot_interval(), trigger)
    }
}
