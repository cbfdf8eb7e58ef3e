//! Snapshot lineage bookkeeping.
//!
//! Snapshots are shared as `Arc<T>`: a channel slot, a worker that loaded a
//! snapshot, and the updater's `latest` all hold strong references, and a
//! snapshot is freed when the last of them is dropped. The [`Ledger`] only
//! observes that lineage through weak references, which is what the cap on
//! simultaneous copies and the metrics are computed from.
mod ledger;
pub use ledger::*;
