//! Durability layer for replog
//!
//! This crate turns payloads into log records and back:
//!
//! - Digest: pluggable payload integrity strategies (CRC32, XXH3-128, SHA-256)
//! - Format: binary frame layout (one log record per frame)
//! - Codec: splits a payload into bounded frames and reassembles/verifies them
//! - Dedup: lossless back-reference deduplication of full-state snapshots
//! - Stream manager: serialized multi-frame appends and lazy verified replay
//! - Log streams: in-memory and single-file implementations of `LogStream`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Entry codec (framing + digest verification)
pub mod dedup; // Snapshot deduplicator
pub mod digest; // Digest strategies
pub mod format; // Frame wire format
pub mod log_stream; // LogStream implementations
pub mod stream_manager; // Per-stream append/replay

pub use codec::EntryCodec;
pub use dedup::{DedupBody, DedupRecord, DedupStats, DeduplicatedSnapshot, SnapshotDeduplicator};
pub use digest::{
    digest_by_name, Crc32Digest, Digest, DigestAlgorithm, Sha256Digest, UnknownDigestError,
    Xxh3Digest, DEFAULT_DIGEST,
};
pub use format::{Frame, FrameError, FRAME_FORMAT_VERSION, FRAME_MAGIC};
pub use log_stream::{FileLogStream, MemoryLogStream};
pub use stream_manager::{
    Replay, ReplayStats, ReplayedPayload, StreamConfig, StreamManager, DEFAULT_MAX_ENTRY_SIZE,
};
