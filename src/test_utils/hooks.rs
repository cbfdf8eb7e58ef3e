use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::SnapshotUpdater;

/// Snapshot of a running sum, plus every record in application order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) sum: i64,
    pub(crate) applied: Vec<i64>,
}

/// Copies the tally and adds every record to it
#[derive(Debug, Default)]
pub(crate) struct TallyHooks;

impl SnapshotUpdater for TallyHooks {
    type Data = Tally;
    type Update = i64;

    fn create_new_copy(
        &mut self,
        current: &Tally,
    ) -> Tally {
        current.clone()
    }

    fn make_updates(
        &mut self,
        data: &mut Tally,
        updates: &mut Vec<i64>,
    ) {
        for update in updates.drain(..) {
            data.sum += update;
            data.applied.push(update);
        }
    }
}

/// A snapshot that counts how many of its kind are alive
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: i64,
    live: Arc<AtomicUsize>,
}

impl Tracked {
    pub(crate) fn new(
        value: i64,
        live: &Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            value,
            live: live.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hooks over [`Tracked`] snapshots
#[derive(Debug, Default)]
pub(crate) struct TrackedHooks {
    pub(crate) live: Arc<AtomicUsize>,
}

impl TrackedHooks {
    pub(crate) fn initial(&self) -> Tracked {
        Tracked::new(0, &self.live)
    }
}

impl SnapshotUpdater for TrackedHooks {
    type Data = Tracked;
    type Update = i64;

    fn create_new_copy(
        &mut self,
        current: &Tracked,
    ) -> Tracked {
        Tracked::new(current.value, &self.live)
    }

    fn make_updates(
        &mut self,
        data: &mut Tracked,
        updates: &mut Vec<i64>,
    ) {
        data.value += updates.drain(..).sum::<i64>();
    }
}

/// Update-only hooks: no copy hook, the context is mutated in place
#[derive(Debug, Default)]
pub(crate) struct InPlaceHooks;

impl SnapshotUpdater for InPlaceHooks {
    type Data = Tally;
    type Update = i64;

    fn make_updates(
        &mut self,
        data: &mut Tally,
        updates: &mut Vec<i64>,
    ) {
        for update in updates.drain(..) {
            data.sum += update;
            data.applied.push(update);
        }
    }
}
