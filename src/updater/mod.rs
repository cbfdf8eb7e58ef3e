//! The snapshot updater: one dedicated thread that drains every client
//! channel, builds a new snapshot from the collected mutation records,
//! publishes it into every channel and reclaims the snapshots no reader can
//! reach any more.
//!
//! Integrators plug their data type in through [`SnapshotUpdater`] and drive
//! the thread through [`SnapshotEngine`].
mod engine;
mod ordering;
mod runner;

pub use engine::*;
pub(crate) use ordering::*;
pub(crate) use runner::*;


#[cfg(test)]
use mockall::automock;

/// Integrator hooks producing new snapshots.
///
/// Both hooks run on the updater thread only.
#[cfg_attr(test, automock(type Data = u64; type Update = i64;))]
pub trait SnapshotUpdater: Send + 'static {
    /// The snapshot type shared with the workers
    type Data: Send + Sync + 'static;

    /// A mutation record submitted by a worker
    type Update: Send + 'static;

    /// Clone a fresh snapshot from the current latest one.
    ///
    /// Required unless the updater runs in update-only mode.
    fn create_new_copy(
        &mut self,
        _current: &Self::Data,
    ) -> Self::Data {
        panic!(
            "Misconfigured updater: implement create_new_copy or turn on updates_only"
        );
    }

    /// Apply a batch of records to `data`.
    ///
    /// `updates` is never empty and is in application order: per channel
    /// FIFO, or global submission order in ordering mode. The engine clears
    /// it afterwards.
    fn make_updates(
        &mut self,
        data: &mut Self::Data,
        updates: &mut Vec<Self::Update>,
    );
}
