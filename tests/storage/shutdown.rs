//! Shutdown Tests
//!
//! `stop()` waits at most the grace period for in-flight snapshot work, then
//! closes the stream. Whatever the abandoned snapshot left behind, a fresh
//! instance must recover every acknowledged mutation.

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn loaded(config: LogStorageConfig) -> TestStorage {
    let t = TestStorage::with_config(config);
    for i in 0..12 {
        t.put(&format!("job/cron/{}", i), &[i as u8; 400]);
    }
    t
}

#[test]
fn stop_during_slow_snapshot_returns_after_grace_period() {
    let grace = Duration::from_millis(100);
    let mut t = loaded(quiet_config().with_shutdown_grace_period(grace));
    let before = entries(t.store());

    // ~5 entries at 300ms each: far longer than the grace period
    t.log.set_append_delay(Duration::from_millis(300));
    let storage = Arc::clone(&t.storage);
    let snapshotter = thread::spawn(move || storage.snapshot());
    assert!(wait_until(Duration::from_secs(5), || {
        t.storage.inner().snapshots_in_flight() == 1
    }));

    let started = Instant::now();
    t.storage.stop();
    let elapsed = started.elapsed();
    assert!(elapsed >= grace, "stop returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(1), "stop took {:?}", elapsed);
    assert_eq!(t.storage.state(), LifecycleState::Stopped);

    // The abandoned snapshot fails once its current entry lands
    assert!(matches!(
        snapshotter.join().unwrap(),
        Err(Error::StreamClosed)
    ));
    t.log.clear_faults();

    t.crash_and_recover();
    assert_eq!(entries(t.store()), before);
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.snapshots, 0);
    assert_eq!(stats.abandoned_runs, 1);
}

#[test]
fn stop_waits_for_snapshot_that_finishes_within_grace() {
    let mut t = loaded(quiet_config().with_shutdown_grace_period(Duration::from_secs(5)));
    let before = entries(t.store());

    t.log.set_append_delay(Duration::from_millis(20));
    let storage = Arc::clone(&t.storage);
    let snapshotter = thread::spawn(move || storage.snapshot());
    assert!(wait_until(Duration::from_secs(5), || {
        t.storage.inner().snapshots_in_flight() == 1
    }));

    t.storage.stop();
    assert_eq!(t.storage.inner().snapshots_in_flight(), 0);
    let position = snapshotter.join().unwrap().unwrap();
    t.log.clear_faults();

    t.crash_and_recover();
    assert_eq!(entries(t.store()), before);
    assert_eq!(t.log.first_position(), position);
    let stats = t.storage.inner().last_replay_stats().unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.mutations, 0);
}

#[test]
fn stop_without_snapshot_in_flight_is_immediate() {
    let t = TestStorage::with_config(
        quiet_config().with_shutdown_grace_period(Duration::from_secs(10)),
    );
    t.put("a", b"1");

    let started = Instant::now();
    t.storage.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn stop_cancels_snapshot_timer() {
    let t = TestStorage::with_config(
        LogStorageConfig::for_testing().with_snapshot_interval(Duration::from_millis(20)),
    );
    assert!(t.storage.inner().log().is_scheduled());

    t.storage.stop();
    assert!(!t.storage.inner().log().is_scheduled());
    let appended = t.log.len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(t.log.len(), appended);
}
