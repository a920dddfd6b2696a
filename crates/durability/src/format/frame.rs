//! Frame format.
//!
//! A payload is split into one or more frames; each frame is appended to the
//! log stream as a single record.
//!
//! # Frame Layout
//!
//! ```text
//! ┌───────────┬─────────┬─────────┬───────────┬───────────┬───────────────┐
//! │ Magic (4) │ Ver (1) │ Kind (1)│ Index (4) │ Total (4) │ DigestLen (1) │
//! ├───────────┴─────────┴─────────┴───────────┴───────────┴───────────────┤
//! │ Digest (DigestLen bytes)                                              │
//! ├──────────────────┬────────────────────────────────────────────────────┤
//! │ ChunkLen (4)     │ Chunk (ChunkLen bytes)                             │
//! └──────────────────┴────────────────────────────────────────────────────┘
//! ```
//!
//! The digest covers the whole payload, not the frame, so it is identical in
//! every frame of a run. All integers are little-endian.

use crate::digest::Digest;
use replog_core::PayloadKind;

/// Magic bytes identifying a frame: "RLFR"
pub const FRAME_MAGIC: [u8; 4] = *b"RLFR";

/// Current frame format version
pub const FRAME_FORMAT_VERSION: u8 = 1;

/// Bytes before the digest: magic + version + kind + index + total + digest_len
const FIXED_PREFIX_SIZE: usize = 4 + 1 + 1 + 4 + 4 + 1;

/// One bounded chunk of a payload plus its positional metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Kind of the payload this frame belongs to
    pub kind: PayloadKind,
    /// Digest of the whole payload
    pub digest: Digest,
    /// Zero-based index of this frame within its run
    pub index: u32,
    /// Number of frames in the run
    pub total: u32,
    /// Chunk of payload bytes
    pub chunk: Vec<u8>,
}

impl Frame {
    /// Size of the serialized frame in bytes.
    pub fn encoded_len(&self) -> usize {
        FIXED_PREFIX_SIZE + self.digest.len() + 4 + self.chunk.len()
    }

    /// Serialize frame to bytes (one log record).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&FRAME_MAGIC);
        bytes.push(FRAME_FORMAT_VERSION);
        bytes.push(self.kind.as_u8());
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.total.to_le_bytes());
        bytes.push(self.digest.len() as u8);
        bytes.extend_from_slice(self.digest.as_bytes());
        bytes.extend_from_slice(&(self.chunk.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.chunk);
        bytes
    }

    /// Deserialize a frame from one log record.
    ///
    /// The record must contain exactly one frame; trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FIXED_PREFIX_SIZE {
            return Err(FrameError::InsufficientData);
        }
        if bytes[0..4] != FRAME_MAGIC {
            return Err(FrameError::BadMagic);
        }
        let version = bytes[4];
        if version != FRAME_FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let kind = PayloadKind::from_u8(bytes[5]).ok_or(FrameError::UnknownKind(bytes[5]))?;
        let index = read_u32(bytes, 6)?;
        let total = read_u32(bytes, 10)?;
        let digest_len = bytes[14] as usize;

        let digest_end = FIXED_PREFIX_SIZE + digest_len;
        let digest = bytes
            .get(FIXED_PREFIX_SIZE..digest_end)
            .ok_or(FrameError::InsufficientData)?;
        let chunk_len = read_u32(bytes, digest_end)? as usize;
        let chunk_start = digest_end + 4;
        let actual = bytes.len() - chunk_start;
        if chunk_len != actual {
            return Err(FrameError::LengthMismatch {
                declared: chunk_len,
                actual,
            });
        }

        Ok(Frame {
            kind,
            digest: Digest::from_bytes(digest),
            index,
            total,
            chunk: bytes[chunk_start..].to_vec(),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, FrameError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(FrameError::InsufficientData)
}

/// Frame parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Record shorter than the frame header
    #[error("Insufficient data to parse frame")]
    InsufficientData,

    /// Magic bytes do not match
    #[error("Invalid frame magic")]
    BadMagic,

    /// Unsupported format version
    #[error("Unsupported frame format version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown payload kind tag
    #[error("Unknown payload kind tag: {0}")]
    UnknownKind(u8),

    /// Declared chunk length disagrees with the record length
    #[error("Chunk length mismatch: header says {declared}, record holds {actual}")]
    LengthMismatch {
        /// Chunk length from the header
        declared: usize,
        /// Bytes actually present
        actual: usize,
    },
}
