//! Log manager: owns the stream manager and the snapshot timer.
//!
//! ## Snapshot schedule
//!
//! `schedule_snapshots` spawns one named thread (`replog-snapshot`) that
//! sleeps on a condvar until the next deadline, then fires the trigger.
//! At most one snapshot cycle runs at a time: a tick that finds a cycle
//! already in flight is dropped, and ticks missed while a long cycle ran are
//! not replayed afterwards.
//!
//! The trigger is held as a `Weak` so the timer never keeps the storage
//! alive; once the storage is dropped the thread exits on its next tick.

use crate::config::LogStorageConfig;
use parking_lot::{Condvar, Mutex};
use replog_core::{Error, LogPosition, LogStream, Result};
use replog_durability::StreamManager;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receiver of timer-driven snapshot requests.
pub trait SnapshotTrigger: Send + Sync {
    /// Run one snapshot cycle. Called on the timer thread.
    fn trigger_snapshot(&self);
}

/// Owns one log stream: appends and replay via the [`StreamManager`],
/// truncation, and the snapshot schedule.
pub struct LogManager {
    stream: Arc<dyn LogStream>,
    streams: StreamManager,
    scheduler: Mutex<Option<SnapshotScheduler>>,
}

impl LogManager {
    /// Validate `config` and build the stream manager for `stream`.
    pub fn open(stream: Arc<dyn LogStream>, config: &LogStorageConfig) -> Result<Self> {
        let stream_config = config.stream_config()?;
        debug!(
            target: "replog::log",
            max_entry_size = stream_config.max_entry_size,
            digest = stream_config.digest.name(),
            first = stream.first_position().value(),
            next = stream.next_position().value(),
            "Opening log"
        );
        Ok(LogManager {
            streams: StreamManager::new(Arc::clone(&stream), stream_config),
            stream,
            scheduler: Mutex::new(None),
        })
    }

    /// Stream manager for appends and replay
    pub fn stream_manager(&self) -> &StreamManager {
        &self.streams
    }

    /// Position replay should start from: the oldest retained record.
    pub fn recovery_start(&self) -> LogPosition {
        self.stream.first_position()
    }

    /// Discard every record before `position`.
    pub fn truncate_before(&self, position: LogPosition) -> Result<()> {
        let first = self.stream.first_position();
        self.stream.truncate_before(position)?;
        debug!(
            target: "replog::log",
            from = first.value(),
            to = position.value(),
            "Truncated log"
        );
        Ok(())
    }

    /// Start the snapshot timer, replacing any running schedule.
    pub fn schedule_snapshots(
        &self,
        interval: Duration,
        trigger: Weak<dyn SnapshotTrigger>,
    ) -> Result<()> {
        let scheduler = SnapshotScheduler::start(interval, trigger)?;
        // Release the lock before cancel() may join the old thread
        let previous = self.scheduler.lock().replace(scheduler);
        if let Some(previous) = previous {
            previous.cancel();
        }
        info!(
            target: "replog::log",
            interval_ms = interval.as_millis() as u64,
            "Scheduled snapshots"
        );
        Ok(())
    }

    /// Stop the snapshot timer. No-op if none is running.
    pub fn cancel(&self) {
        let taken = self.scheduler.lock().take();
        if let Some(scheduler) = taken {
            scheduler.cancel();
        }
    }

    /// Whether a snapshot timer is running
    pub fn is_scheduled(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Counters of the running timer, if any
    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.lock().as_ref().map(SnapshotScheduler::stats)
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Snapshot scheduler
// ============================================================================

/// Snapshot timer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Snapshot cycles started
    pub fired: u64,
    /// Ticks dropped because a cycle was in flight or already overdue
    pub coalesced: u64,
}

struct SchedulerInner {
    trigger: Weak<dyn SnapshotTrigger>,
    interval: Duration,
    cancelled: Mutex<bool>,
    wake: Condvar,
    in_flight: AtomicBool,
    fired: AtomicU64,
    coalesced: AtomicU64,
}

impl SchedulerInner {
    /// Run one cycle unless another is in flight. Returns false when the
    /// trigger has been dropped.
    fn fire(&self) -> bool {
        let Some(trigger) = self.trigger.upgrade() else {
            return false;
        };
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(target: "replog::log", "Snapshot already in flight, tick coalesced");
            return true;
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        trigger.trigger_snapshot();
        self.in_flight.store(false, Ordering::Release);
        true
    }

    fn run(&self) {
        let mut deadline = Instant::now() + self.interval;
        loop {
            {
                let mut cancelled = self.cancelled.lock();
                while !*cancelled {
                    if self.wake.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                if *cancelled {
                    break;
                }
            }

            if !self.fire() {
                debug!(target: "replog::log", "Snapshot trigger dropped, timer exiting");
                break;
            }

            deadline += self.interval;
            let now = Instant::now();
            if deadline <= now {
                let missed = (now - deadline).as_nanos() / self.interval.as_nanos().max(1) + 1;
                self.coalesced.fetch_add(missed as u64, Ordering::Relaxed);
                debug!(
                    target: "replog::log",
                    missed = missed as u64,
                    "Snapshot cycle overran its interval, ticks coalesced"
                );
                deadline = now + self.interval;
            }
        }
    }
}

/// Periodic snapshot timer running on its own thread.
pub struct SnapshotScheduler {
    inner: Arc<SchedulerInner>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotScheduler {
    /// Spawn the timer thread. The first tick fires one `interval` from now.
    pub fn start(interval: Duration, trigger: Weak<dyn SnapshotTrigger>) -> Result<Self> {
        let inner = Arc::new(SchedulerInner {
            trigger,
            interval,
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
            in_flight: AtomicBool::new(false),
            fired: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        });

        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("replog-snapshot".to_string())
            .spawn(move || thread_inner.run())
            .map_err(|e| Error::Config(format!("failed to spawn snapshot thread: {}", e)))?;

        Ok(SnapshotScheduler {
            inner,
            handle: Some(handle),
        })
    }

    /// Fire a cycle now on the calling thread, coalesced with the timer.
    ///
    /// Returns false if the cycle was skipped because one was in flight or
    /// the trigger is gone.
    pub fn fire_now(&self) -> bool {
        let before = self.inner.fired.load(Ordering::Relaxed);
        self.inner.fire() && self.inner.fired.load(Ordering::Relaxed) > before
    }

    /// Whether a cycle is currently running
    pub fn in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Timer counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            fired: self.inner.fired.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Stop the timer.
    ///
    /// Waits for the thread only when it is idle; a cycle in progress is
    /// left to finish on its own so shutdown stays bounded.
    pub fn cancel(mut self) {
        self.signal_cancel();
        if let Some(handle) = self.handle.take() {
            if self.in_flight() || handle.thread().id() == std::thread::current().id() {
                debug!(target: "replog::log", "Detaching snapshot thread with cycle in flight");
            } else if handle.join().is_err() {
                warn!(target: "replog::log", "Snapshot thread panicked");
            }
        }
    }

    fn signal_cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.wake.notify_all();
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.signal_cancel();
    }
}
