//! Call-order gate for durable storage.
//!
//! [`CallOrderEnforcingStorage`] wraps any [`NonVolatileStorage`] and owns
//! its lifecycle state. Every transition happens in one place, under one
//! lock:
//!
//! | From            | Event                 | To           |
//! |-----------------|-----------------------|--------------|
//! | NotStarted      | `start()`             | Recovering   |
//! | Recovering      | recovery succeeded    | Ready        |
//! | Recovering      | recovery failed       | Stopped      |
//! | Ready           | `snapshot()` begins   | Snapshotting |
//! | Snapshotting    | snapshot ends         | Ready        |
//! | any             | `stop()`              | Stopped      |
//!
//! `write` is accepted in `Ready` and `Snapshotting`, `snapshot` only in
//! `Ready`. Anything else fails with `Error::IllegalState` and never reaches
//! the wrapped storage. The lock is not held while the wrapped storage runs.

use crate::log_manager::SnapshotTrigger;
use crate::storage::NonVolatileStorage;
use parking_lot::Mutex;
use replog_core::{Error, LifecycleState, LogPosition, Result};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Storage decorator that rejects out-of-order calls.
pub struct CallOrderEnforcingStorage<T: NonVolatileStorage> {
    inner: T,
    state: Mutex<LifecycleState>,
    this: Weak<Self>,
}

impl<T: NonVolatileStorage + 'static> CallOrderEnforcingStorage<T> {
    /// Wrap `inner`. The gate starts in `NotStarted`.
    pub fn new(inner: T) -> Arc<Self> {
        Arc::new_cyclic(|this| CallOrderEnforcingStorage {
            inner,
            state: Mutex::new(LifecycleState::NotStarted),
            this: this.clone(),
        })
    }

    /// The wrapped storage
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Move from `from` to `to`, or fail naming `call`.
    fn transition(&self, call: &'static str, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(Error::IllegalState {
                call,
                state: *state,
            });
        }
        debug!(target: "replog::lifecycle", from = %from, to = %to, "Transition");
        *state = to;
        Ok(())
    }

    /// Move from `from` to `to` if still in `from`; a concurrent `stop()`
    /// wins.
    fn settle(&self, from: LifecycleState, to: LifecycleState) {
        let mut state = self.state.lock();
        if *state == from {
            debug!(target: "replog::lifecycle", from = %from, to = %to, "Transition");
            *state = to;
        }
    }

    fn trigger(&self) -> Weak<dyn SnapshotTrigger> {
        let this: Weak<Self> = self.this.clone();
        this
    }
}

impl<T: NonVolatileStorage + 'static> NonVolatileStorage for CallOrderEnforcingStorage<T> {
    type Op = T::Op;

    fn start(&self) -> Result<()> {
        self.transition("start", LifecycleState::NotStarted, LifecycleState::Recovering)?;

        if let Err(e) = self.inner.start() {
            warn!(target: "replog::lifecycle", error = %e, "Recovery failed, stopping");
            self.settle(LifecycleState::Recovering, LifecycleState::Stopped);
            return Err(e);
        }
        self.settle(LifecycleState::Recovering, LifecycleState::Ready);
        if self.state() != LifecycleState::Ready {
            // Stopped during recovery
            return Ok(());
        }

        info!(target: "replog::lifecycle", "Storage ready");
        self.inner.on_ready(self.trigger())
    }

    fn write(&self, batch: &[T::Op]) -> Result<LogPosition> {
        let state = self.state();
        if !state.accepts_writes() {
            return Err(Error::IllegalState {
                call: "write",
                state,
            });
        }
        self.inner.write(batch)
    }

    fn snapshot(&self) -> Result<LogPosition> {
        self.transition("snapshot", LifecycleState::Ready, LifecycleState::Snapshotting)?;
        let result = self.inner.snapshot();
        self.settle(LifecycleState::Snapshotting, LifecycleState::Ready);
        result
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Stopped {
                return;
            }
            let from = *state;
            *state = LifecycleState::Stopped;
            debug!(target: "replog::lifecycle", from = %from, to = "STOPPED", "Transition");
        }
        self.inner.stop();
    }

    fn on_ready(&self, trigger: Weak<dyn SnapshotTrigger>) -> Result<()> {
        self.inner.on_ready(trigger)
    }
}

impl<T: NonVolatileStorage + 'static> SnapshotTrigger for CallOrderEnforcingStorage<T> {
    fn trigger_snapshot(&self) {
        match self.snapshot() {
            Ok(position) => {
                debug!(target: "replog::lifecycle", position = position.value(), "Scheduled snapshot done");
            }
            Err(Error::IllegalState { state, .. }) => {
                debug!(target: "replog::lifecycle", state = %state, "Skipping scheduled snapshot");
            }
            Err(e) => {
                warn!(target: "replog::lifecycle", error = %e, "Scheduled snapshot failed");
            }
        }
    }
}
