//! Client channels joining and leaving a running engine
use std::sync::Arc;
use std::thread;

use snapshot_updater::SnapshotEngine;

use crate::common::config;
use crate::common::eventually;
use crate::common::CounterHooks;
use crate::common::WAIT;

#[test]
fn leaving_channel_has_queued_records_applied() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(config(2), initial, hooks).unwrap();
    engine.start().unwrap();

    let leaving = engine.channel(1).unwrap();
    for update in 1..=10 {
        leaving.submit(update).unwrap();
    }
    engine.decrease_client_count(1).unwrap();

    assert_eq!(engine.latest_snapshot().unwrap().value, 55);
    assert_eq!(engine.client_count(), 1);
    assert!(leaving.submit(1).unwrap_err().is_closed());

    engine.stop();
}

#[test]
fn joined_channel_participates_in_updates() {
    let (hooks, initial) = CounterHooks::new();
    let engine = SnapshotEngine::new(config(1), initial, hooks).unwrap();
    engine.start().unwrap();

    engine.channel(0).unwrap().submit(1).unwrap();
    let joined = engine.increase_client_count(1).unwrap();
    joined.submit(2).unwrap();

    assert!(eventually(WAIT, || joined.reader_ready().unwrap().value == 3));
    engine.stop();
}

#[test]
fn channels_can_join_and_leave_under_load() {
    let (hooks, initial) = CounterHooks::new();
    let engine = Arc::new(SnapshotEngine::new(config(1), initial, hooks).unwrap());
    engine.start().unwrap();

    let steady = engine.channel(0).unwrap();
    let worker = thread::spawn(move || {
        for _ in 0..500 {
            steady.submit(1).unwrap();
        }
    });

    let mut expected = 500;
    for round in 1..=20 {
        let joined = engine.increase_client_count(1).unwrap();
        joined.submit(round).unwrap();
        expected += round;
        engine.decrease_client_count(1).unwrap();
    }
    worker.join().unwrap();

    let channel = engine.channel(0).unwrap();
    assert!(eventually(WAIT, || channel.reader_ready().unwrap().value == expected));
    engine.stop();
}
