//! Crash Recovery Tests
//!
//! Abandon storage instances without shutdown, tear appends mid-run and
//! damage the log, then verify what a fresh instance recovers.

use crate::common::*;
use std::sync::Arc;

#[test]
fn crash_without_snapshot_recovers_every_mutation() {
    let mut t = TestStorage::new();
    t.put("job/web/0", b"m1");
    t.put("job/web/1", b"m2");
    t.put("job/web/2", b"m3");
    let before = entries(t.store());

    t.crash_and_recover();

    assert_eq!(entries(t.store()), before);
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.mutations, 3);
    assert_eq!(stats.snapshots, 0);
    assert_eq!(stats.abandoned_runs, 0);
}

#[test]
fn mutations_replay_in_log_order() {
    let mut t = TestStorage::new();
    t.put("k", b"first");
    t.storage.write(&[StoreOp::delete("k")]).unwrap();
    t.put("k", b"last");

    t.crash_and_recover();
    assert_eq!(t.store().get("k"), Some(b"last".to_vec()));
}

#[test]
fn large_mutation_batch_survives_restart() {
    let mut t = TestStorage::new();
    // Several times the 1 KiB test entry size
    let batch: Vec<StoreOp> = (0..50)
        .map(|i| StoreOp::put(format!("task-{}", i), vec![i as u8; 200]))
        .collect();
    t.storage.write(&batch).unwrap();
    assert!(t.log.len() > 1);

    t.crash_and_recover();
    assert_eq!(t.store().len(), 50);
    assert_eq!(t.store().get("task-49"), Some(vec![49u8; 200]));
}

#[test]
fn torn_snapshot_append_is_skipped_on_recovery() {
    let mut t = TestStorage::new();
    for i in 0..20 {
        t.put(&format!("job/batch/{}", i), &[i as u8; 300]);
    }
    let before = entries(t.store());

    // The snapshot spans several entries; only its first one lands
    t.log.fail_appends_after(1);
    let err = t.storage.snapshot().unwrap_err();
    assert!(matches!(err, Error::AppendFailed(_)));
    assert_eq!(t.storage.state(), LifecycleState::Ready);
    t.log.clear_faults();

    t.crash_and_recover();
    assert_eq!(entries(t.store()), before);
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.abandoned_runs, 1);
    assert_eq!(stats.snapshots, 0);
}

#[test]
fn torn_run_followed_by_new_writes_recovers() {
    let mut t = TestStorage::new();
    t.put("a", b"1");

    t.log.fail_appends_after(2);
    let big: Vec<StoreOp> = (0..40)
        .map(|i| StoreOp::put(format!("big-{}", i), vec![7u8; 200]))
        .collect();
    assert!(matches!(
        t.storage.write(&big),
        Err(Error::AppendFailed(_))
    ));
    // A failed write is never applied
    assert_eq!(t.store().get("big-0"), None);
    t.log.clear_faults();

    t.put("b", b"2");
    t.crash_and_recover();

    assert_eq!(t.store().get("a"), Some(b"1".to_vec()));
    assert_eq!(t.store().get("b"), Some(b"2".to_vec()));
    assert_eq!(t.store().get("big-0"), None);
}

#[test]
fn corrupted_entry_fails_recovery_and_stops_gate() {
    let t = TestStorage::new();
    t.put("a", &[1; 64]);
    t.put("b", &[2; 64]);

    let record = t.log.record(LogPosition::new(1)).unwrap();
    assert!(t.log.corrupt_byte(LogPosition::new(1), record.data.len() - 3));

    let restarted = build_storage(Arc::new(t.log.clone()), quiet_config());
    assert!(matches!(restarted.start(), Err(Error::Corruption(_))));
    assert_eq!(restarted.state(), LifecycleState::Stopped);
    assert!(matches!(
        restarted.write(&[StoreOp::put("c", b"3".to_vec())]),
        Err(Error::IllegalState {
            call: "write",
            state: LifecycleState::Stopped
        })
    ));
}

#[test]
fn missing_entry_inside_run_is_corruption() {
    let t = TestStorage::new();
    let batch: Vec<StoreOp> = (0..30)
        .map(|i| StoreOp::put(format!("k{}", i), vec![3u8; 200]))
        .collect();
    t.storage.write(&batch).unwrap();
    assert!(t.log.len() >= 3);
    assert!(t.log.remove_record(LogPosition::new(1)));

    let restarted = build_storage(Arc::new(t.log.clone()), quiet_config());
    assert!(matches!(restarted.start(), Err(Error::Corruption(_))));
}

#[test]
fn recovery_with_mismatched_digest_is_corruption() {
    let t = TestStorage::new();
    t.put("a", b"1");

    let restarted = build_storage(
        Arc::new(t.log.clone()),
        quiet_config().with_digest("sha256"),
    );
    assert!(matches!(restarted.start(), Err(Error::Corruption(_))));
}
