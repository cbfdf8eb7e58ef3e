use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use snapshot_updater::SnapshotUpdater;
use snapshot_updater::UpdaterConfig;

pub const WAIT: Duration = Duration::from_secs(10);

pub fn config(num_clients: usize) -> UpdaterConfig {
    UpdaterConfig {
        name: "integration".into(),
        num_clients,
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn eventually(
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A running sum that counts how many instances are alive
#[derive(Debug)]
pub struct Counter {
    pub value: i64,
    pub applied: Vec<i64>,
    live: Arc<AtomicUsize>,
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default, Clone)]
pub struct CounterStats {
    pub live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    pub copies: Arc<AtomicUsize>,
}

impl CounterStats {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    fn counter(
        &self,
        value: i64,
        applied: Vec<i64>,
    ) -> Counter {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Counter {
            value,
            applied,
            live: self.live.clone(),
        }
    }
}

/// Copy-on-write hooks over [`Counter`]
#[derive(Debug, Default)]
pub struct CounterHooks {
    pub stats: CounterStats,
}

impl CounterHooks {
    pub fn new() -> (Self, Counter) {
        let hooks = Self::default();
        let initial = hooks.stats.counter(0, Vec::new());
        (hooks, initial)
    }
}

impl SnapshotUpdater for CounterHooks {
    type Data = Counter;
    type Update = i64;

    fn create_new_copy(
        &mut self,
        current: &Counter,
    ) -> Counter {
        self.stats.copies.fetch_add(1, Ordering::SeqCst);
        self.stats.counter(current.value, current.applied.clone())
    }

    fn make_updates(
        &mut self,
        data: &mut Counter,
        updates: &mut Vec<i64>,
    ) {
        for update in updates.drain(..) {
            data.value += update;
            data.applied.push(update);
        }
    }
}

/// Hooks that forgot to provide a copy hook
pub struct NoCopyHooks;

impl SnapshotUpdater for NoCopyHooks {
    type Data = i64;
    type Update = i64;

    fn make_updates(
        &mut self,
        data: &mut i64,
        updates: &mut Vec<i64>,
    ) {
        *data += updates.drain(..).sum::<i64>();
    }
}
