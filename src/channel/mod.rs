//! Per-worker client channels.
//!
//! A [`ClientChannel`] mediates everything one worker thread exchanges with
//! the updater: the worker submits mutation records into a bounded queue and
//! reads published snapshots from a pointer pair, the updater drains the
//! queue and installs new snapshots. The queue lock is only ever contended
//! by those two parties.
mod client_channel;
pub use client_channel::*;


use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;

/// A mutation record tagged with its global sequence number.
///
/// The sequence is 0 when ordering mode is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Stamped<U> {
    pub(crate) seq: u64,
    pub(crate) update: U,
}

/// The wakeup shared by all channels of one updater.
///
/// Capacity one: a full doorbell already carries a pending wakeup, so
/// ringing never blocks a worker.
pub(crate) fn doorbell() -> (Sender<()>, Receiver<()>) {
    crossbeam_channel::bounded(1)
}
