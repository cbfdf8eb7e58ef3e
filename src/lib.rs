//! Copy-on-write snapshot updater.
//!
//! A set of worker threads reads a shared data structure without locks while
//! a single updater thread applies the mutations the workers submit. Every
//! update pass builds a fresh snapshot from the latest one, publishes it to
//! every worker's [`ClientChannel`], and reclaims snapshots once no worker can
//! reach them any more.
//!
//! The entry point is [`SnapshotEngine`], parameterized by the integrator's
//! [`SnapshotUpdater`] hooks and configured through [`UpdaterConfig`].

mod channel;
mod config;
mod constants;
mod errors;
mod metrics;
mod snapshot;
mod updater;

pub use channel::*;
pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use snapshot::*;
pub use updater::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
