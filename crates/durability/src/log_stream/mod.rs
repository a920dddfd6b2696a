//! `LogStream` implementations.
//!
//! - [`MemoryLogStream`]: shared in-memory log with fault injection, used to
//!   simulate restarts and failing transports
//! - [`FileLogStream`]: single-file log with CRC-protected records

mod file;
mod memory;

pub use file::FileLogStream;
pub use memory::MemoryLogStream;
