//! In-memory log stream.
//!
//! Handles are cheap to clone and share one log, so dropping an engine and
//! building a new one on a clone of the same handle simulates a process
//! restart against durable storage.

use parking_lot::{Mutex, RwLock};
use replog_core::{LogPosition, LogRecord, LogRecordIter, LogStream, LogStreamError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    records: VecDeque<LogRecord>,
    first: LogPosition,
    next: LogPosition,
}

impl MemoryState {
    fn index_of(&self, position: LogPosition) -> usize {
        self.records.partition_point(|r| r.position < position)
    }
}

#[derive(Debug, Default)]
struct Faults {
    append_delay: Option<Duration>,
    /// Appends still allowed before every append is rejected
    remaining_appends: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: RwLock<MemoryState>,
    faults: Mutex<Faults>,
}

/// Shared in-memory log.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogStream {
    inner: Arc<MemoryInner>,
}

impl MemoryLogStream {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.inner.state.read().records.len()
    }

    /// Whether no records are retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every retained record, in order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.inner.state.read().records.iter().cloned().collect()
    }

    /// Copy of the record at `position`, if retained.
    pub fn record(&self, position: LogPosition) -> Option<LogRecord> {
        let state = self.inner.state.read();
        state
            .records
            .get(state.index_of(position))
            .filter(|r| r.position == position)
            .cloned()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Allow `count` more appends, then reject every append.
    pub fn fail_appends_after(&self, count: usize) {
        self.inner.faults.lock().remaining_appends = Some(count);
    }

    /// Sleep for `delay` before every append.
    pub fn set_append_delay(&self, delay: Duration) {
        self.inner.faults.lock().append_delay = Some(delay);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        *self.inner.faults.lock() = Faults::default();
    }

    /// XOR one byte of a stored record. Returns false if nothing was changed.
    pub fn corrupt_byte(&self, position: LogPosition, offset: usize) -> bool {
        let mut state = self.inner.state.write();
        let index = state.index_of(position);
        match state.records.get_mut(index) {
            Some(record) if record.position == position && offset < record.data.len() => {
                record.data[offset] ^= 0xFF;
                true
            }
            _ => false,
        }
    }

    /// Drop a single record, leaving a gap. Returns false if it was absent.
    pub fn remove_record(&self, position: LogPosition) -> bool {
        let mut state = self.inner.state.write();
        let index = state.index_of(position);
        if state.records.get(index).map(|r| r.position) == Some(position) {
            state.records.remove(index);
            true
        } else {
            false
        }
    }
}

impl LogStream for MemoryLogStream {
    fn append(&self, data: &[u8]) -> Result<LogPosition, LogStreamError> {
        let delay = {
            let mut faults = self.inner.faults.lock();
            if let Some(remaining) = faults.remaining_appends.as_mut() {
                if *remaining == 0 {
                    return Err(LogStreamError::Rejected(
                        "injected append failure".to_string(),
                    ));
                }
                *remaining -= 1;
            }
            faults.append_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.inner.state.write();
        let position = state.next;
        state.records.push_back(LogRecord {
            position,
            data: data.to_vec(),
        });
        state.next = position.next();
        Ok(position)
    }

    fn read_from(&self, from: LogPosition) -> Result<LogRecordIter, LogStreamError> {
        let end = {
            let state = self.inner.state.read();
            if from > state.next {
                return Err(LogStreamError::InvalidPosition(from));
            }
            state.next
        };
        Ok(Box::new(MemoryRecordIter {
            inner: Arc::clone(&self.inner),
            cursor: from,
            end,
        }))
    }

    fn truncate_before(&self, position: LogPosition) -> Result<(), LogStreamError> {
        let mut state = self.inner.state.write();
        if position > state.next {
            return Err(LogStreamError::InvalidPosition(position));
        }
        let cut = state.index_of(position);
        state.records.drain(..cut);
        state.first = state.first.max(position);
        Ok(())
    }

    fn first_position(&self) -> LogPosition {
        let state = self.inner.state.read();
        state.records.front().map_or(state.first.max(state.next), |r| r.position)
    }

    fn next_position(&self) -> LogPosition {
        self.inner.state.read().next
    }
}

/// Reads one record per step under a short read lock.
struct MemoryRecordIter {
    inner: Arc<MemoryInner>,
    cursor: LogPosition,
    end: LogPosition,
}

impl Iterator for MemoryRecordIter {
    type Item = Result<LogRecord, LogStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let state = self.inner.state.read();
        let record = state
            .records
            .get(state.index_of(self.cursor))
            .filter(|r| r.position < self.end)?
            .clone();
        self.cursor = record.position.next();
        Some(Ok(record))
    }
}
