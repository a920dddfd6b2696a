//! Snapshot Lifecycle Tests
//!
//! Snapshots compact the log: recovery restores the latest snapshot and
//! replays only the mutations logged after it.

use crate::common::*;
use std::sync::Arc;
use std::thread;

#[test]
fn snapshot_plus_later_mutation_replays_both() {
    let mut t = TestStorage::new();
    t.put("m1", b"1");
    t.put("m2", b"2");
    t.storage.snapshot().unwrap();
    t.put("m3", b"3");
    let before = entries(t.store());

    t.restart();

    assert_eq!(entries(t.store()), before);
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.mutations, 1);
}

#[test]
fn snapshot_truncates_earlier_entries() {
    let t = TestStorage::new();
    for i in 0..10 {
        t.put(&format!("k{}", i), b"v");
    }
    let position = t.storage.snapshot().unwrap();

    assert_eq!(t.log.first_position(), position);
    assert_eq!(t.storage.inner().log().recovery_start(), position);
    assert!(t.log.records().iter().all(|r| r.position >= position));
}

#[test]
fn latest_snapshot_wins() {
    let mut t = TestStorage::new();
    t.put("a", b"old");
    t.storage.snapshot().unwrap();
    t.storage.write(&[StoreOp::delete("a")]).unwrap();
    t.put("b", b"new");
    t.storage.snapshot().unwrap();

    t.crash_and_recover();
    assert_eq!(t.store().get("a"), None);
    assert_eq!(t.store().get("b"), Some(b"new".to_vec()));
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.mutations, 0);
}

#[test]
fn empty_store_snapshot_recovers_empty() {
    let mut t = TestStorage::new();
    t.storage.snapshot().unwrap();
    t.crash_and_recover();
    assert!(t.store().is_empty());
    assert_eq!(t.storage.inner().last_replay_stats().unwrap().snapshots, 1);
}

#[test]
fn repeated_bodies_are_stored_once() {
    let mut t = TestStorage::new();
    let config = vec![b'x'; 1000];
    let batch: Vec<StoreOp> = (0..500)
        .map(|i| StoreOp::put(format!("job/web/{:04}", i), config.clone()))
        .collect();
    for chunk in batch.chunks(50) {
        t.storage.write(chunk).unwrap();
    }
    t.storage.snapshot().unwrap();

    // Only the snapshot remains in the log
    let logged: usize = t.log.records().iter().map(|r| r.data.len()).sum();
    assert!(
        logged < 500 * 1000 / 10,
        "snapshot used {} bytes for 500 identical 1000-byte bodies",
        logged
    );

    t.crash_and_recover();
    assert_eq!(t.store().len(), 500);
    assert_eq!(t.store().get("job/web/0499"), Some(config));
}

#[test]
fn writes_concurrent_with_snapshots_are_never_lost() {
    let mut t = TestStorage::new();
    let storage = Arc::clone(&t.storage);

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..100 {
                    storage
                        .write(&[StoreOp::put(format!("w{}-{}", w, i), vec![w as u8; 16])])
                        .unwrap();
                }
            })
        })
        .collect();

    let mut taken = 0;
    loop {
        storage.snapshot().unwrap();
        taken += 1;
        if writers.iter().all(|h| h.is_finished()) {
            break;
        }
    }
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(taken >= 1);
    let before = entries(t.store());
    assert_eq!(before.len(), 400);

    t.crash_and_recover();
    assert_eq!(entries(t.store()), before);
}
