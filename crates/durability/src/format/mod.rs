//! Byte formats for frames and the file-backed log.
//!
//! Keeping serialization separate from operational logic (how frames are
//! grouped, how the log file is managed) keeps format evolution contained.
//!
//! # Module Structure
//!
//! - `frame`: one bounded chunk of a payload, one log record per frame
//! - `log_record`: file header and record layout used by `FileLogStream`

pub mod frame;
pub mod log_record;

pub use frame::{Frame, FrameError, FRAME_FORMAT_VERSION, FRAME_MAGIC};
pub use log_record::{
    LogFileHeader, StreamRecord, StreamRecordError, LOG_FILE_FORMAT_VERSION,
    LOG_FILE_HEADER_SIZE, LOG_FILE_MAGIC, MAX_RECORD_DATA_SIZE, MAX_RECORD_LENGTH,
};
