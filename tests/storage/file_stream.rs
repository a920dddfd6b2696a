//! File Stream Tests
//!
//! Full storage lifecycle over `FileLogStream`: reopen, torn tails and
//! truncation after snapshots.

use crate::common::*;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open(path: &Path) -> Arc<Storage> {
    init_tracing();
    let stream = Arc::new(FileLogStream::open(path).unwrap());
    let storage = build_storage(stream, quiet_config());
    storage.start().unwrap();
    storage
}

#[test]
fn file_log_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scheduler.log");

    let before = {
        let storage = open(&path);
        for i in 0..10 {
            storage
                .write(&[StoreOp::put(format!("task-{}", i), vec![i as u8; 700])])
                .unwrap();
        }
        storage.write(&[StoreOp::delete("task-3")]).unwrap();
        let before = storage.inner().store().entries();
        storage.stop();
        before
    };

    let storage = open(&path);
    assert_eq!(storage.inner().store().entries(), before);
    assert_eq!(storage.inner().store().get("task-3"), None);
}

#[test]
fn snapshot_shrinks_file_and_recovers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scheduler.log");

    let before = {
        let storage = open(&path);
        let body = vec![b'c'; 900];
        for i in 0..40 {
            storage
                .write(&[StoreOp::put(format!("job/web/{}", i), body.clone())])
                .unwrap();
        }
        let size_before = file_size(&path);
        storage.snapshot().unwrap();
        assert!(file_size(&path) < size_before / 4);
        storage.write(&[StoreOp::put("after", b"snapshot".to_vec())]).unwrap();
        let before = storage.inner().store().entries();
        storage.stop();
        before
    };

    let storage = open(&path);
    assert_eq!(storage.inner().store().entries(), before);
    let stats = storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.mutations, 1);
}

#[test]
fn torn_file_tail_is_dropped_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scheduler.log");

    let before = {
        let storage = open(&path);
        storage.write(&[StoreOp::put("a", b"1".to_vec())]).unwrap();
        storage.write(&[StoreOp::put("b", b"2".to_vec())]).unwrap();
        storage.inner().store().entries()
    };
    let size = file_size(&path);
    // Half of a record header: a write cut short by a crash
    append_bytes(&path, &[40, 0, 0, 0, 7, 7]);

    let storage = open(&path);
    assert_eq!(storage.inner().store().entries(), before);
    assert_eq!(file_size(&path), size);

    storage.write(&[StoreOp::put("c", b"3".to_vec())]).unwrap();
    storage.stop();
    let storage = open(&path);
    assert_eq!(storage.inner().store().len(), 3);
}
