//! Snapshot Updater Error Hierarchy
//!
//! The engine is a concurrency primitive, not an I/O boundary, so the
//! recoverable taxonomy is small: configuration problems, failures of the
//! hosting system (thread creation), and submissions a client channel could
//! not accept. Misuse of the engine is a programming error and panics.

use std::fmt;
use std::io;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Updater configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failures of the hosting system (threads, control channel)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// The dedicated updater thread could not be created
    #[error("Failed to spawn updater thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// The updater thread is gone (it panicked or already exited)
    #[error("Updater thread is not available")]
    UpdaterUnavailable,
}

/// A mutation record a client channel refused.
///
/// The record is handed back to the caller so nothing submitted is ever
/// silently lost.
#[derive(thiserror::Error, PartialEq, Eq)]
pub enum SubmitError<U> {
    /// The channel queue reached `queue_max` and the policy is `reject`
    #[error("client channel queue is full")]
    QueueFull(U),

    /// The engine is stopped or the channel has been removed
    #[error("client channel is closed")]
    Closed(U),
}

impl<U> SubmitError<U> {
    /// Take back the record that was not submitted
    pub fn into_inner(self) -> U {
        match self {
            SubmitError::QueueFull(update) | SubmitError::Closed(update) => update,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, SubmitError::QueueFull(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SubmitError::Closed(_))
    }
}

// Like crossbeam's TrySendError, don't require the payload to be Debug.
impl<U> fmt::Debug for SubmitError<U> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SubmitError::QueueFull(_) => f.write_str("QueueFull(..)"),
            SubmitError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}
