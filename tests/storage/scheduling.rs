//! Snapshot Scheduling Tests
//!
//! Timer-driven snapshots go through the lifecycle gate like any caller.

use crate::common::*;
use replog::SnapshotTrigger;
use std::sync::Arc;
use std::time::Duration;

fn timed_config(interval_ms: u64) -> LogStorageConfig {
    LogStorageConfig::for_testing().with_snapshot_interval(Duration::from_millis(interval_ms))
}

#[test]
fn timer_is_not_scheduled_before_start() {
    let t = TestStorage::unstarted();
    assert!(!t.storage.inner().log().is_scheduled());
    t.storage.start().unwrap();
    assert!(t.storage.inner().log().is_scheduled());
}

#[test]
fn scheduled_snapshots_compact_the_log() {
    let mut t = TestStorage::with_config(timed_config(30));
    for i in 0..20 {
        t.put(&format!("k{}", i), b"value");
    }
    let first_write = LogPosition::START;

    assert!(wait_until(Duration::from_secs(5), || {
        t.log.first_position() > first_write
    }));
    let stats = t.storage.inner().log().scheduler_stats().unwrap();
    assert!(stats.fired >= 1);

    let before = entries(t.store());
    t.restart();
    assert_eq!(entries(t.store()), before);
    assert_eq!(t.storage.inner().last_replay_stats().unwrap().snapshots, 1);
}

#[test]
fn slow_scheduled_snapshots_coalesce_ticks() {
    let t = TestStorage::with_config(
        timed_config(10).with_shutdown_grace_period(Duration::from_secs(5)),
    );
    for i in 0..6 {
        t.put(&format!("k{}", i), &[i as u8; 500]);
    }
    // Each snapshot takes several intervals
    t.log.set_append_delay(Duration::from_millis(30));

    assert!(wait_until(Duration::from_secs(5), || {
        t.storage
            .inner()
            .log()
            .scheduler_stats()
            .map_or(false, |s| s.coalesced >= 1)
    }));
    t.storage.stop();
    assert!(t.storage.inner().snapshots_in_flight() <= 1);
}

#[test]
fn scheduled_tick_after_stop_is_skipped() {
    let t = TestStorage::with_config(timed_config(10));
    t.storage.stop();
    let appended = t.log.len();

    // A tick delivered by hand to a stopped gate does nothing
    t.storage.trigger_snapshot();
    assert_eq!(t.log.len(), appended);
    assert_eq!(t.storage.state(), LifecycleState::Stopped);
}

#[test]
fn timer_does_not_keep_storage_alive() {
    let t = TestStorage::with_config(timed_config(10));
    let weak = Arc::downgrade(&t.storage);
    drop(t);
    assert!(wait_until(Duration::from_secs(2), || weak.upgrade().is_none()));
}
