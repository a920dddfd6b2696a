//! Stream manager: one instance per log stream.
//!
//! ## Appends
//!
//! A payload is encoded into a run of frames and every frame is appended as
//! one log record. Appends are serialized by a mutex, so the frames of one
//! payload always occupy contiguous positions. The returned position is the
//! position of the run's first frame.
//!
//! ## Replay
//!
//! `replay_from` returns a lazy, finite iterator that groups frames into
//! runs, verifies each run through the [`EntryCodec`] and yields decoded
//! payloads in log order. The first integrity error ends the replay.
//!
//! A run whose frames are well-formed and contiguous from index 0 but which
//! stops early, either at the end of the log or where the next run begins,
//! is an append that never completed (crash or shutdown mid-append). It was
//! never acknowledged to a caller, so replay skips it and counts it in
//! [`ReplayStats::abandoned_runs`]. Every other irregularity is corruption.
//!
//! Appends take consecutive positions, so a gap between two records read in
//! one replay means a record was lost. That is corruption too, even where
//! the lost record was the last frame of a run and the frames around it
//! would otherwise look like an abandoned append.

use crate::codec::EntryCodec;
use crate::digest::{DigestAlgorithm, Xxh3Digest};
use crate::format::Frame;
use parking_lot::Mutex;
use replog_core::{
    Error, LogPosition, LogRecordIter, LogStream, LogStreamError, Payload, PayloadKind, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum entry size: 512 KiB
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 512 * 1024;

/// Stream manager configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum payload bytes per frame
    pub max_entry_size: usize,
    /// Payload digest strategy
    pub digest: Arc<dyn DigestAlgorithm>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            digest: Arc::new(Xxh3Digest),
        }
    }
}

impl StreamConfig {
    /// Set maximum entry size (builder pattern).
    pub fn with_max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Set digest strategy (builder pattern).
    pub fn with_digest(mut self, digest: Arc<dyn DigestAlgorithm>) -> Self {
        self.digest = digest;
        self
    }
}

/// Owns one log stream: serialized appends and verified replay.
pub struct StreamManager {
    stream: Arc<dyn LogStream>,
    codec: EntryCodec,
    append_lock: Mutex<()>,
    closed: AtomicBool,
}

impl StreamManager {
    /// Create a stream manager for `stream`.
    pub fn new(stream: Arc<dyn LogStream>, config: StreamConfig) -> Self {
        StreamManager {
            stream,
            codec: EntryCodec::new(config.max_entry_size, config.digest),
            append_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Underlying log stream
    pub fn stream(&self) -> &Arc<dyn LogStream> {
        &self.stream
    }

    /// Entry codec in use
    pub fn codec(&self) -> &EntryCodec {
        &self.codec
    }

    /// Append one payload as a contiguous run of frames.
    ///
    /// Blocks until every frame is acknowledged by the stream. If the stream
    /// rejects a frame mid-run, or the manager is closed mid-run, the frames
    /// already written form an abandoned run that replay will skip.
    pub fn append(&self, payload: &Payload) -> Result<LogPosition> {
        let frames = self.codec.encode(payload)?;
        let total = frames.len();

        let _guard = self.append_lock.lock();
        let mut first = None;
        for frame in &frames {
            if self.is_closed() {
                if first.is_some() {
                    warn!(
                        target: "replog::stream",
                        kind = %payload.kind(),
                        written = frame.index,
                        total,
                        "Stream closed mid-append, abandoning run"
                    );
                }
                return Err(Error::StreamClosed);
            }
            let position = self
                .stream
                .append(&frame.to_bytes())
                .map_err(|e| Error::AppendFailed(e.to_string()))?;
            first.get_or_insert(position);
        }

        // encode() never yields an empty run
        let position = first.ok_or_else(|| Error::AppendFailed("empty frame run".to_string()))?;
        debug!(
            target: "replog::stream",
            kind = %payload.kind(),
            bytes = payload.len(),
            frames = total,
            position = position.value(),
            "Appended payload"
        );
        Ok(position)
    }

    /// Replay payloads starting at `from`.
    pub fn replay_from(&self, from: LogPosition) -> Result<Replay> {
        let records = self.stream.read_from(from)?;
        Ok(Replay {
            records,
            codec: self.codec.clone(),
            pending: None,
            last_read: None,
            stats: ReplayStats::default(),
            done: false,
        })
    }

    /// Refuse all further appends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One payload recovered from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedPayload {
    /// Position of the run's first frame
    pub position: LogPosition,
    /// Position of the run's last frame
    pub end_position: LogPosition,
    /// Decoded, verified payload
    pub payload: Payload,
}

/// Replay counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Payloads yielded
    pub payloads: usize,
    /// Frames read (including frames of abandoned runs)
    pub frames: usize,
    /// Mutation payloads yielded
    pub mutations: usize,
    /// Snapshot payloads yielded
    pub snapshots: usize,
    /// Incomplete runs skipped.
    ///
    /// A run counts as abandoned only when every frame it has sits at
    /// consecutive positions up to the end of the log or up to the next
    /// run. A run missing its last frame because that record was lost
    /// surfaces as a position gap, which is corruption, not an abandoned
    /// run. Recovery cannot tell an abandoned run from an acknowledged
    /// payload whose trailing frames were all lost from the end of the log.
    pub abandoned_runs: usize,
    /// Position of the last frame read
    pub last_position: Option<LogPosition>,
}

/// Lazy replay iterator returned by [`StreamManager::replay_from`].
///
/// Yields `Ok(ReplayedPayload)` in log order. After the first `Err`, the
/// iterator is exhausted.
pub struct Replay {
    records: LogRecordIter,
    codec: EntryCodec,
    pending: Option<(LogPosition, Frame)>,
    last_read: Option<LogPosition>,
    stats: ReplayStats,
    done: bool,
}

impl Replay {
    /// Counters accumulated so far
    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    fn next_frame(&mut self) -> Option<Result<(LogPosition, Frame)>> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(LogStreamError::Corrupted(detail)) => {
                return Some(Err(Error::corruption(detail)));
            }
            Err(e) => return Some(Err(Error::Stream(e))),
        };
        if let Some(last) = self.last_read {
            if record.position != last.next() {
                return Some(Err(Error::corruption(format!(
                    "record missing: expected position {}, found {}",
                    last.next(),
                    record.position
                ))));
            }
        }
        self.last_read = Some(record.position);
        self.stats.frames += 1;
        self.stats.last_position = Some(record.position);
        match Frame::from_bytes(&record.data) {
            Ok(frame) => Some(Ok((record.position, frame))),
            Err(e) => Some(Err(Error::corruption(format!(
                "unreadable frame at position {}: {}",
                record.position, e
            )))),
        }
    }

    fn read_run(&mut self) -> Result<Option<ReplayedPayload>> {
        loop {
            let (start, first) = match self.next_frame() {
                None => return Ok(None),
                Some(frame) => frame?,
            };
            if first.index != 0 {
                return Err(Error::corruption(format!(
                    "frame at position {} has index {} but no run is open",
                    start, first.index
                )));
            }

            let total = first.total as usize;
            let mut end = start;
            let mut run = vec![first];
            let mut cut_short = false;
            while run.len() < total {
                match self.next_frame() {
                    None => {
                        cut_short = true;
                        break;
                    }
                    Some(frame) => {
                        let (position, frame) = frame?;
                        if frame.index == 0 {
                            self.pending = Some((position, frame));
                            cut_short = true;
                            break;
                        }
                        end = position;
                        run.push(frame);
                    }
                }
            }

            if cut_short {
                self.codec.check_run(&run).map_err(|e| {
                    Error::corruption(format!("run at position {}: {}", start, e))
                })?;
                warn!(
                    target: "replog::stream",
                    position = start.value(),
                    frames = run.len(),
                    total,
                    "Skipping abandoned append"
                );
                self.stats.abandoned_runs += 1;
                continue;
            }

            let payload = self
                .codec
                .decode(&run)
                .map_err(|e| Error::corruption(format!("run at position {}: {}", start, e)))?;
            self.stats.payloads += 1;
            match payload.kind() {
                PayloadKind::Mutation => self.stats.mutations += 1,
                PayloadKind::Snapshot => self.stats.snapshots += 1,
            }
            return Ok(Some(ReplayedPayload {
                position: start,
                end_position: end,
                payload,
            }));
        }
    }
}

impl Iterator for Replay {
    type Item = Result<ReplayedPayload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_run() {
            Ok(Some(replayed)) => Some(Ok(replayed)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
