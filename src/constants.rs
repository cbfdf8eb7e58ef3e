// -
// Updater defaults

/// Thread and metric label prefix of an updater instance
pub(crate) const DEFAULT_UPDATER_NAME: &str = "snapshot-updater";

/// Mutation records a client channel holds before `submit` applies the queue-full policy
pub(crate) const DEFAULT_QUEUE_MAX: usize = 1024;

/// Short wait used for opportunistic and capped garbage collection (microseconds)
pub(crate) const DEFAULT_GARBAGE_WAIT_US: u64 = 100;

/// Opportunistic waits an idle updater spends on uncollected snapshots before blocking
pub(crate) const DEFAULT_OPPORTUNISTIC_GC_ROUNDS: u32 = 4;

// -
// Environment

/// Prefix of environment overrides, e.g. `UPDATER__QUEUE_MAX=64`
pub(crate) const ENV_PREFIX: &str = "UPDATER";

/// Environment variable naming an optional configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

// -
// Metrics

/// Label carried by every updater metric
pub(crate) const METRIC_UPDATER_LABEL: &str = "updater";
