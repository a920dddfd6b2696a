//! Call Order Tests
//!
//! The lifecycle gate rejects out-of-order calls before they reach the log.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn write_before_start_is_illegal_and_appends_nothing() {
    let t = TestStorage::unstarted();
    let err = t
        .storage
        .write(&[StoreOp::put("a", b"1".to_vec())])
        .unwrap_err();

    assert!(matches!(
        err,
        Error::IllegalState {
            call: "write",
            state: LifecycleState::NotStarted
        }
    ));
    assert_eq!(err.to_string(), "Illegal call to write() in state NOT_STARTED");
    assert!(t.log.is_empty());
    assert!(t.store().is_empty());
}

#[test]
fn snapshot_before_start_is_illegal() {
    let t = TestStorage::unstarted();
    assert!(matches!(
        t.storage.snapshot(),
        Err(Error::IllegalState {
            call: "snapshot",
            state: LifecycleState::NotStarted
        })
    ));
    assert!(t.log.is_empty());
}

#[test]
fn start_twice_is_illegal() {
    let t = TestStorage::new();
    assert!(matches!(
        t.storage.start(),
        Err(Error::IllegalState {
            call: "start",
            state: LifecycleState::Ready
        })
    ));
}

#[test]
fn calls_after_stop_are_illegal() {
    let t = TestStorage::new();
    t.put("a", b"1");
    t.storage.stop();
    t.storage.stop();
    assert_eq!(t.storage.state(), LifecycleState::Stopped);

    let appended = t.log.len();
    assert!(matches!(
        t.storage.write(&[StoreOp::put("b", b"2".to_vec())]),
        Err(Error::IllegalState {
            state: LifecycleState::Stopped,
            ..
        })
    ));
    assert!(t.storage.snapshot().is_err());
    assert_eq!(t.log.len(), appended);
}

#[test]
fn concurrent_snapshot_is_rejected_but_writes_proceed() {
    let t = TestStorage::new();
    for i in 0..8 {
        t.put(&format!("k{}", i), &[i as u8; 300]);
    }

    // Slow down every entry so the snapshot stays in flight
    t.log.set_append_delay(Duration::from_millis(40));
    let appended = t.log.len();
    let storage = Arc::clone(&t.storage);
    let snapshotter = thread::spawn(move || storage.snapshot());

    // First snapshot entry landed: the snapshot now holds the apply lock
    assert!(wait_until(Duration::from_secs(5), || t.log.len() > appended));
    assert_eq!(t.storage.state(), LifecycleState::Snapshotting);
    assert!(matches!(
        t.storage.snapshot(),
        Err(Error::IllegalState {
            call: "snapshot",
            state: LifecycleState::Snapshotting
        })
    ));

    // Accepted while snapshotting; lands after the snapshot
    let write_position = t
        .storage
        .write(&[StoreOp::put("during", b"x".to_vec())])
        .unwrap();
    let snapshot_position = snapshotter.join().unwrap().unwrap();
    assert!(write_position > snapshot_position);
    assert_eq!(t.storage.state(), LifecycleState::Ready);
    t.log.clear_faults();

    let mut t = t;
    t.crash_and_recover();
    assert_eq!(t.store().get("during"), Some(b"x".to_vec()));
    assert_eq!(t.store().len(), 9);
}
