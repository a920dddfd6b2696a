//! Single-file log stream.
//!
//! Layout is described in [`crate::format::log_record`]. Every append is
//! written with one `write_all` and synced before it is acknowledged.
//!
//! ## Recovery on open
//!
//! The file is scanned front to back. A record that stops short of the end of
//! the file, or a final record whose CRC does not match, is a write torn by a
//! crash. It was never acknowledged, so the file is truncated back to the
//! last valid record. The open fails instead when the damage cannot be a
//! torn final write: a CRC failure followed by more data, a length field
//! larger than any record, or a short record with an intact record after it.
//!
//! If rolling back a failed append also fails, the stream refuses further
//! appends until it is reopened.
//!
//! ## Truncation
//!
//! `truncate_before` copies the retained records into a temporary file whose
//! header carries the new base position, syncs it, and renames it over the
//! log. Positions therefore survive truncation unchanged.

use crate::format::{
    LogFileHeader, StreamRecord, StreamRecordError, LOG_FILE_HEADER_SIZE, MAX_RECORD_DATA_SIZE,
    MAX_RECORD_LENGTH,
};
use parking_lot::Mutex;
use replog_core::{LogPosition, LogRecord, LogRecordIter, LogStream, LogStreamError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const HEADER_SIZE: u64 = LOG_FILE_HEADER_SIZE as u64;

/// Log stream persisted in one file.
#[derive(Debug)]
pub struct FileLogStream {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    first: LogPosition,
    next: LogPosition,
    /// Byte offset of each retained record; index `i` holds position `first + i`
    offsets: Vec<u64>,
    /// Byte offset where the next record will be written
    end: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl FileState {
    fn offset_of(&self, position: LogPosition) -> u64 {
        let index = position.value().saturating_sub(self.first.value()) as usize;
        self.offsets.get(index).copied().unwrap_or(self.end)
    }
}

/// A torn write found at the end of the file on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TornTail {
    valid_end: u64,
    original_size: u64,
}

impl TornTail {
    fn bytes_to_truncate(&self) -> u64 {
        self.original_size - self.valid_end
    }
}

struct Scan {
    offsets: Vec<u64>,
    valid_end: u64,
    torn: Option<TornTail>,
}

impl FileLogStream {
    /// Open the log at `path`, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogStreamError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            write_log_file(&path, LogHeaderSource::Empty(LogPosition::START))?;
            info!(target: "replog::log_stream", path = %path.display(), "Created log file");
        }

        let mut bytes = Vec::new();
        File::open(&path)?.read_to_end(&mut bytes)?;
        let header = read_header(&bytes)?;
        let first = LogPosition::new(header.base_position);
        let scan = scan_records(&bytes, first)?;

        let file = OpenOptions::new().append(true).open(&path)?;
        if let Some(torn) = scan.torn {
            warn!(
                target: "replog::log_stream",
                path = %path.display(),
                valid_end = torn.valid_end,
                bytes_removed = torn.bytes_to_truncate(),
                "Truncating torn tail"
            );
            file.set_len(torn.valid_end)?;
            file.sync_all()?;
        }

        let next = LogPosition::new(first.value() + scan.offsets.len() as u64);
        debug!(
            target: "replog::log_stream",
            path = %path.display(),
            first = first.value(),
            next = next.value(),
            "Opened log file"
        );
        Ok(FileLogStream {
            path,
            state: Mutex::new(FileState {
                file,
                first,
                next,
                offsets: scan.offsets,
                end: scan.valid_end,
                poisoned: false,
            }),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStream for FileLogStream {
    fn append(&self, data: &[u8]) -> Result<LogPosition, LogStreamError> {
        if data.len() > MAX_RECORD_DATA_SIZE {
            return Err(LogStreamError::Rejected(format!(
                "record of {} bytes exceeds maximum {}",
                data.len(),
                MAX_RECORD_DATA_SIZE
            )));
        }
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(LogStreamError::Rejected(format!(
                "log file {} has unknown trailing bytes after a failed append; reopen it",
                self.path.display()
            )));
        }
        let position = state.next;
        let bytes = StreamRecord::new(position, data.to_vec()).to_bytes();

        let written = state
            .file
            .write_all(&bytes)
            .and_then(|()| state.file.sync_data());
        if let Err(e) = written {
            // Drop whatever part of the record reached the file
            let end = state.end;
            if let Err(rollback) = state.file.set_len(end) {
                error!(
                    target: "replog::log_stream",
                    path = %self.path.display(),
                    end,
                    error = %rollback,
                    "Failed to roll back partial append, refusing further appends"
                );
                state.poisoned = true;
            }
            return Err(LogStreamError::Io(e));
        }

        let offset = state.end;
        state.offsets.push(offset);
        state.end += bytes.len() as u64;
        state.next = position.next();
        Ok(position)
    }

    fn read_from(&self, from: LogPosition) -> Result<LogRecordIter, LogStreamError> {
        let state = self.state.lock();
        if from > state.next {
            return Err(LogStreamError::InvalidPosition(from));
        }
        let start = from.max(state.first);
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(state.offset_of(start)))?;
        Ok(Box::new(FileRecordIter {
            reader: BufReader::new(file),
            expected: start,
            remaining: state.next.value() - start.value(),
            failed: false,
        }))
    }

    fn truncate_before(&self, position: LogPosition) -> Result<(), LogStreamError> {
        let mut state = self.state.lock();
        if position > state.next {
            return Err(LogStreamError::InvalidPosition(position));
        }
        if position <= state.first {
            return Ok(());
        }

        let cut = state.offset_of(position);
        let original_size = state.end;
        write_log_file(
            &self.path,
            LogHeaderSource::CopyFrom {
                base: position,
                start: cut,
                end: state.end,
            },
        )?;
        state.file = OpenOptions::new().append(true).open(&self.path)?;

        let dropped = (position.value() - state.first.value()) as usize;
        let shift = cut - HEADER_SIZE;
        let drained = dropped.min(state.offsets.len());
        state.offsets.drain(..drained);
        for offset in state.offsets.iter_mut() {
            *offset -= shift;
        }
        state.end -= shift;
        state.first = position;

        info!(
            target: "replog::log_stream",
            position = position.value(),
            records_dropped = dropped,
            bytes_removed = original_size - state.end,
            "Log truncated"
        );
        Ok(())
    }

    fn first_position(&self) -> LogPosition {
        self.state.lock().first
    }

    fn next_position(&self) -> LogPosition {
        self.state.lock().next
    }
}

// ============================================================================
// File helpers
// ============================================================================

enum LogHeaderSource {
    /// New file with no records
    Empty(LogPosition),
    /// Copy bytes `start..end` of the current file after a new header
    CopyFrom {
        base: LogPosition,
        start: u64,
        end: u64,
    },
}

/// Write a complete log file next to `path`, sync it, and rename it into place.
fn write_log_file(path: &Path, source: LogHeaderSource) -> io::Result<()> {
    let temp_path = path.with_extension("log.tmp");
    let base = match source {
        LogHeaderSource::Empty(base) => base,
        LogHeaderSource::CopyFrom { base, .. } => base,
    };

    let mut temp = File::create(&temp_path)?;
    temp.write_all(&LogFileHeader::new(base.value()).to_bytes())?;
    if let LogHeaderSource::CopyFrom { start, end, .. } = source {
        let mut current = File::open(path)?;
        current.seek(SeekFrom::Start(start))?;
        let copied = io::copy(&mut current.take(end - start), &mut temp)?;
        if copied != end - start {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected to copy {} bytes, copied {}", end - start, copied),
            ));
        }
    }
    temp.sync_all()?;
    drop(temp);

    fs::rename(&temp_path, path)?;
    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn read_header(bytes: &[u8]) -> Result<LogFileHeader, LogStreamError> {
    let raw: &[u8; LOG_FILE_HEADER_SIZE] = bytes
        .get(..LOG_FILE_HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| LogStreamError::Corrupted("log file shorter than its header".to_string()))?;
    LogFileHeader::from_bytes(raw)
        .filter(LogFileHeader::is_valid)
        .ok_or_else(|| LogStreamError::Corrupted("invalid log file header".to_string()))
}

fn scan_records(bytes: &[u8], first: LogPosition) -> Result<Scan, LogStreamError> {
    let original_size = bytes.len() as u64;
    let mut offsets = Vec::new();
    let mut offset = LOG_FILE_HEADER_SIZE;
    let mut torn = None;

    while offset < bytes.len() {
        let remaining = &bytes[offset..];
        match StreamRecord::from_bytes(remaining) {
            Ok((record, consumed)) => {
                let expected = first.value() + offsets.len() as u64;
                if record.position.value() != expected {
                    return Err(LogStreamError::Corrupted(format!(
                        "record at offset {} has position {}, expected {}",
                        offset, record.position, expected
                    )));
                }
                offsets.push(offset as u64);
                offset += consumed;
            }
            Err(StreamRecordError::InsufficientData) => {
                let expected = LogPosition::new(first.value() + offsets.len() as u64);
                if let Some(at) = find_record(bytes, offset + 1, expected.next()) {
                    return Err(LogStreamError::Corrupted(format!(
                        "record at offset {} is cut short but record {} follows at offset {}",
                        offset,
                        expected.next(),
                        at
                    )));
                }
                torn = Some(TornTail {
                    valid_end: offset as u64,
                    original_size,
                });
                break;
            }
            Err(StreamRecordError::ChecksumMismatch { .. })
                if StreamRecord::peek_length(remaining).map(|len| 4 + len)
                    == Ok(remaining.len()) =>
            {
                torn = Some(TornTail {
                    valid_end: offset as u64,
                    original_size,
                });
                break;
            }
            Err(e) => {
                return Err(LogStreamError::Corrupted(format!(
                    "record at offset {}: {}",
                    offset, e
                )));
            }
        }
    }

    Ok(Scan {
        offsets,
        valid_end: torn.map_or(original_size, |t| t.valid_end),
        torn,
    })
}

/// Offset of the first intact record at or after `from` holding `position`.
fn find_record(bytes: &[u8], from: usize, position: LogPosition) -> Option<usize> {
    let wanted = position.value().to_le_bytes();
    (from..bytes.len()).find(|&at| {
        bytes.get(at + 4..at + 12) == Some(&wanted[..])
            && StreamRecord::from_bytes(&bytes[at..])
                .map_or(false, |(record, _)| record.position == position)
    })
}

/// Reads a fixed number of records through its own file handle.
struct FileRecordIter {
    reader: BufReader<File>,
    expected: LogPosition,
    remaining: u64,
    failed: bool,
}

impl FileRecordIter {
    fn read_record(&mut self) -> Result<LogRecord, LogStreamError> {
        let mut prefix = [0u8; 4];
        self.reader.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_RECORD_LENGTH {
            return Err(LogStreamError::Corrupted(format!(
                "record at position {} declares length {}",
                self.expected, len
            )));
        }

        let mut buf = Vec::with_capacity(4 + len);
        buf.extend_from_slice(&prefix);
        buf.resize(4 + len, 0);
        self.reader.read_exact(&mut buf[4..])?;

        let (record, _) = StreamRecord::from_bytes(&buf).map_err(|e| {
            LogStreamError::Corrupted(format!("record at position {}: {}", self.expected, e))
        })?;
        if record.position != self.expected {
            return Err(LogStreamError::Corrupted(format!(
                "found position {} where {} was expected",
                record.position, self.expected
            )));
        }
        Ok(LogRecord {
            position: record.position,
            data: record.data,
        })
    }
}

impl Iterator for FileRecordIter {
    type Item = Result<LogRecord, LogStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        match self.read_record() {
            Ok(record) => {
                self.remaining -= 1;
                self.expected = self.expected.next();
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
