//! Start, stop and restart of a snapshot engine
use std::panic;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use std::time::Instant;

use snapshot_updater::ShutdownMode;
use snapshot_updater::SnapshotEngine;
use snapshot_updater::SubmitError;
use snapshot_updater::UpdaterConfig;

use crate::common::config;
use crate::common::eventually;
use crate::common::CounterHooks;
use crate::common::NoCopyHooks;
use crate::common::WAIT;

fn draining(num_clients: usize) -> UpdaterConfig {
    UpdaterConfig {
        shutdown: ShutdownMode::DrainToEmpty,
        ..config(num_clients)
    }
}

#[test]
fn drain_shutdown_applies_every_submitted_record() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(draining(1), initial, hooks).unwrap();
    engine.start().unwrap();

    let channel = engine.channel(0).unwrap();
    for update in [1, 2, 3] {
        channel.submit(update).unwrap();
    }
    engine.stop();

    let latest = engine.latest_snapshot().unwrap();
    assert_eq!(latest.value, 6);
    assert_eq!(latest.applied, vec![1, 2, 3]);
}

#[test]
fn readers_observe_monotonic_snapshots() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(draining(2), initial, hooks).unwrap();
    engine.start().unwrap();

    let writer = engine.channel(0).unwrap();
    let reader = engine.channel(1).unwrap();
    let mut last_seen = 0;
    for _ in 0..200 {
        writer.submit(1).unwrap();
        let snapshot = reader.reader_ready().unwrap();
        assert!(snapshot.value >= last_seen);
        last_seen = snapshot.value;
    }

    assert!(eventually(WAIT, || reader.reader_ready().unwrap().value == 200));
    engine.stop();
}

#[test]
fn immediate_stop_returns_promptly_and_refuses_new_records() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(config(2), initial, hooks).unwrap();
    engine.start().unwrap();

    let channel = engine.channel(0).unwrap();
    for update in 0..100 {
        channel.submit(update).unwrap();
    }

    let started = Instant::now();
    engine.stop();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(!engine.is_running());
    assert!(matches!(channel.submit(1), Err(SubmitError::Closed(1))));
}

#[test]
fn restart_resumes_with_latest_snapshot() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(draining(1), initial, hooks).unwrap();
    let channel = engine.channel(0).unwrap();

    engine.start().unwrap();
    channel.submit(10).unwrap();
    engine.stop();
    assert!(channel.reader_ready().is_none());

    engine.start().unwrap();
    assert!(eventually(WAIT, || channel
        .reader_ready()
        .is_some_and(|snapshot| snapshot.value == 10)));
    channel.submit(5).unwrap();
    engine.stop();

    assert_eq!(engine.latest_snapshot().unwrap().value, 15);
}

#[test]
fn missing_copy_hook_surfaces_on_stop() {
    let engine = SnapshotEngine::new(draining(1), 0, NoCopyHooks).unwrap();
    engine.start().unwrap();
    engine.channel(0).unwrap().submit(1).unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(|| engine.stop()));

    let payload = result.expect_err("updater thread panicked");
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .unwrap_or_default();
    assert!(message.contains("Misconfigured updater"), "{message}");
}

#[test]
fn update_only_engine_needs_no_copy_hook() {
    let config = UpdaterConfig {
        updates_only: true,
        ..draining(2)
    };
    let engine = SnapshotEngine::new(config, 0, NoCopyHooks).unwrap();
    engine.start().unwrap();

    engine.channel(0).unwrap().submit(4).unwrap();
    engine.channel(1).unwrap().submit(5).unwrap();
    engine.stop();

    assert_eq!(*engine.latest_snapshot().unwrap(), 9);
}
