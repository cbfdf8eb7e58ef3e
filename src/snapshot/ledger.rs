use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

/// Outcome of one collection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collection {
    /// Entries found unreachable and dropped from the ledger in this pass
    pub freed: usize,
    /// Entries still reachable, latest included
    pub live: usize,
}

impl Collection {
    /// Copies that may be collected at any time: everything but the latest
    pub fn outstanding(&self) -> usize {
        self.live.saturating_sub(1)
    }
}

/// Every snapshot created by one updater that has not yet been proven
/// unreachable.
///
/// Only the updater thread touches the ledger.
pub struct Ledger<T> {
    entries: Vec<Weak<T>>,
}

impl<T> Default for Ledger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Ledger<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Track a newly built snapshot
    pub fn record(
        &mut self,
        snapshot: &Arc<T>,
    ) {
        self.entries.push(Arc::downgrade(snapshot));
    }

    /// Drop the entries no reader can reach any more
    pub fn collect(&mut self) -> Collection {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.strong_count() > 0);
        let live = self.entries.len();

        Collection {
            freed: before - live,
            live,
        }
    }

    /// Entries tracked right now, including ones not yet found unreachable
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for Ledger<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Ledger").field("entries", &self.entries.len()).finish()
    }
}
