//! End-to-end tests for log-backed storage.
//!
//! Each test drives the gated storage through a full lifecycle
//! (start → write/snapshot → stop or crash → recover) and checks what a
//! fresh instance recovers from the same log.

#[path = "../common/mod.rs"]
mod common;

mod call_order;
mod crash_recovery;
mod file_stream;
mod scheduling;
mod shutdown;
mod snapshot_lifecycle;
