//! Log file and record format used by `FileLogStream`.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ File Header (16 bytes)             │
//! ├────────────────────────────────────┤
//! │ Record (position = base)           │
//! ├────────────────────────────────────┤
//! │ Record (position = base + 1)       │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Position (8) │ Data (variable)         │ CRC32 (4)│
//! └─────────────────┴──────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! The length field counts position + data + crc. The CRC covers position
//! and data.

use crc32fast::Hasher;
use replog_core::LogPosition;

/// Magic bytes identifying a log file: "RLOG"
pub const LOG_FILE_MAGIC: [u8; 4] = *b"RLOG";

/// Current log file format version
pub const LOG_FILE_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const LOG_FILE_HEADER_SIZE: usize = 16;

/// Largest record data accepted: a 64 MiB entry plus frame header room.
pub const MAX_RECORD_DATA_SIZE: usize = 64 * 1024 * 1024 + 1024;

/// Largest value the length field may hold (position + data + crc).
pub const MAX_RECORD_LENGTH: usize = 8 + MAX_RECORD_DATA_SIZE + 4;

/// Log file header (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFileHeader {
    /// Magic bytes: "RLOG"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Position of the first record in the file.
    ///
    /// Raised by truncation so positions stay monotonic across rewrites.
    pub base_position: u64,
}

impl LogFileHeader {
    /// Create a new header.
    pub fn new(base_position: u64) -> Self {
        LogFileHeader {
            magic: LOG_FILE_MAGIC,
            format_version: LOG_FILE_FORMAT_VERSION,
            base_position,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; LOG_FILE_HEADER_SIZE] {
        let mut bytes = [0u8; LOG_FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.base_position.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; LOG_FILE_HEADER_SIZE]) -> Option<Self> {
        Some(LogFileHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            base_position: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
        })
    }

    /// Validate magic bytes and version.
    pub fn is_valid(&self) -> bool {
        self.magic == LOG_FILE_MAGIC && self.format_version == LOG_FILE_FORMAT_VERSION
    }
}

/// One record of the log file.
///
/// Each record is self-delimiting with a length prefix and CRC32 checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Position assigned on append
    pub position: LogPosition,

    /// Record bytes
    pub data: Vec<u8>,
}

impl StreamRecord {
    /// Create a new record.
    pub fn new(position: LogPosition, data: Vec<u8>) -> Self {
        StreamRecord { position, data }
    }

    /// Serialize record to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_len = 8 + self.data.len() + 4;
        let mut record = Vec::with_capacity(4 + total_len);
        record.extend_from_slice(&(total_len as u32).to_le_bytes());
        record.extend_from_slice(&self.position.value().to_le_bytes());
        record.extend_from_slice(&self.data);

        let crc = Self::compute_crc(&record[4..]);
        record.extend_from_slice(&crc.to_le_bytes());
        record
    }

    /// Deserialize record from bytes.
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), StreamRecordError> {
        let length = Self::peek_length(bytes)?;
        if length < 12 {
            return Err(StreamRecordError::InvalidFormat);
        }
        if length > MAX_RECORD_LENGTH {
            return Err(StreamRecordError::LengthTooLarge(length));
        }
        if bytes.len() < 4 + length {
            return Err(StreamRecordError::InsufficientData);
        }

        let body = &bytes[4..4 + length - 4];
        let stored_crc = u32::from_le_bytes(
            bytes[4 + length - 4..4 + length]
                .try_into()
                .map_err(|_| StreamRecordError::InvalidFormat)?,
        );
        let computed_crc = Self::compute_crc(body);
        if computed_crc != stored_crc {
            return Err(StreamRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let position = u64::from_le_bytes(
            body[0..8]
                .try_into()
                .map_err(|_| StreamRecordError::InvalidFormat)?,
        );
        let record = StreamRecord {
            position: LogPosition::new(position),
            data: body[8..].to_vec(),
        };
        Ok((record, 4 + length))
    }

    /// Read the length prefix of a serialized record.
    pub fn peek_length(bytes: &[u8]) -> Result<usize, StreamRecordError> {
        let prefix: [u8; 4] = bytes
            .get(0..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(StreamRecordError::InsufficientData)?;
        Ok(u32::from_le_bytes(prefix) as usize)
    }

    fn compute_crc(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Log record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamRecordError {
    /// Not enough data to parse record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Length field exceeds the largest possible record
    #[error("Record length {0} exceeds maximum {}", MAX_RECORD_LENGTH)]
    LengthTooLarge(usize),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },
}
