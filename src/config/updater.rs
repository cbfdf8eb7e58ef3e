use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_GARBAGE_WAIT_US;
use crate::constants::DEFAULT_OPPORTUNISTIC_GC_ROUNDS;
use crate::constants::DEFAULT_QUEUE_MAX;
use crate::constants::DEFAULT_UPDATER_NAME;
use crate::Error;
use crate::Result;

/// What the updater does with queued records when it is asked to stop
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Exit at the next loop head. Queued records stay unapplied.
    #[default]
    Immediate,
    /// Keep collecting and applying until every queue is empty, then exit
    DrainToEmpty,
}

/// What `ClientChannel::submit` does when the channel queue is full
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullPolicy {
    /// Wait until the updater drains the queue
    #[default]
    Block,
    /// Hand the record back with `SubmitError::QueueFull`
    Reject,
}

/// Construction-time configuration of one snapshot updater
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdaterConfig {
    /// Prefix of the updater thread name and of its metric label
    #[serde(default = "default_name")]
    pub name: String,

    /// Client channels created up front. Pass 0 when workers join and
    /// leave dynamically.
    #[serde(default)]
    pub num_clients: usize,

    /// Max queue length of one client channel
    #[serde(default = "default_queue_max")]
    pub queue_max: usize,

    /// Maximum number of simultaneous uncollected snapshot copies.
    /// `<= 0` means unlimited, `1` is rejected.
    #[serde(default)]
    pub cap_copies: i64,

    /// Apply records in global submission order across channels
    #[serde(default)]
    pub order_updates: bool,

    /// Only collect and apply records. No snapshot is copied or published.
    #[serde(default)]
    pub updates_only: bool,

    #[serde(default)]
    pub shutdown: ShutdownMode,

    #[serde(default)]
    pub queue_full: QueueFullPolicy,

    /// Sleep between garbage collection attempts (microseconds)
    #[serde(default = "default_garbage_wait_us")]
    pub garbage_wait_us: u64,

    /// How many short waits an idle updater spends collecting garbage before
    /// it blocks until the next submission
    #[serde(default = "default_opportunistic_gc_rounds")]
    pub opportunistic_gc_rounds: u32,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            num_clients: 0,
            queue_max: default_queue_max(),
            cap_copies: 0,
            order_updates: false,
            updates_only: false,
            shutdown: ShutdownMode::default(),
            queue_full: QueueFullPolicy::default(),
            garbage_wait_us: default_garbage_wait_us(),
            opportunistic_gc_rounds: default_opportunistic_gc_rounds(),
        }
    }
}

impl UpdaterConfig {
    pub fn validate(self) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "name cannot be empty".into(),
            )));
        }

        if self.queue_max == 0 {
            return Err(Error::Config(ConfigError::Message(
                "queue_max must be greater than 0".into(),
            )));
        }

        // Double buffered publication keeps the previous copy alive, a cap of
        // one could never be satisfied.
        if self.cap_copies == 1 {
            return Err(Error::Config(ConfigError::Message(
                "cap_copies cannot be 1 (use 0 for unlimited or at least 2)".into(),
            )));
        }

        if self.garbage_wait_us == 0 {
            return Err(Error::Config(ConfigError::Message(
                "garbage_wait_us must be at least 1us".into(),
            )));
        }

        Ok(self)
    }

    /// The snapshot cap, `None` when unlimited
    pub fn cap(&self) -> Option<usize> {
        (self.cap_copies > 0).then_some(self.cap_copies as usize)
    }

    pub fn garbage_wait(&self) -> Duration {
        Duration::from_micros(self.garbage_wait_us)
    }

    pub fn drains_on_shutdown(&self) -> bool {
        self.shutdown == ShutdownMode::DrainToEmpty
    }
}

fn default_name() -> String {
    DEFAULT_UPDATER_NAME.to_string()
}
fn default_queue_max() -> usize {
    DEFAULT_QUEUE_MAX
}
// in us
fn default_garbage_wait_us() -> u64 {
    DEFAULT_GARBAGE_WAIT_US
}
fn default_opportunistic_gc_rounds() -> u32 {
    DEFAULT_OPPORTUNISTIC_GC_ROUNDS
}
