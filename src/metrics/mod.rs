//! Prometheus metrics of snapshot updaters.
//!
//! Every series carries an `updater` label with the instance name
//! (`<name>-NN`) so several engines in one process stay distinguishable.
//! Stalled readers show up as a growing `snapshot_live_copies` and
//! `snapshot_cap_waits_total`; a backed up queue as
//! `snapshot_queue_full_total`.


use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;

use crate::constants::METRIC_UPDATER_LABEL;

lazy_static! {
    pub static ref SNAPSHOT_COPIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshot_copies_total", "Snapshots created by the updater"),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref SNAPSHOT_CAP_WAITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "snapshot_cap_waits_total",
            "Times the updater waited for a copy to be released because of cap_copies"
        ),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref UPDATES_APPLIED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshot_updates_applied_total", "Mutation records applied"),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref BUSY_CHANNEL_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "snapshot_busy_channel_retries_total",
            "Drains postponed because the owning worker held the channel lock"
        ),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_FULL_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "snapshot_queue_full_total",
            "Submissions that found the client channel queue full"
        ),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref LIVE_COPIES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("snapshot_live_copies", "Snapshots not yet collected, latest included"),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref DEFERRED_UPDATES: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "snapshot_deferred_updates",
            "Collected records waiting for a missing sequence number"
        ),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref CLIENT_CHANNELS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("snapshot_client_channels", "Client channels owned by the updater"),
        &[METRIC_UPDATER_LABEL]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(SNAPSHOT_COPIES_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SNAPSHOT_CAP_WAITS_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(UPDATES_APPLIED_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BUSY_CHANNEL_RETRIES_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(QUEUE_FULL_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LIVE_COPIES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DEFERRED_UPDATES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CLIENT_CHANNELS.clone()))
        .expect("collector can be registered");
}

/// Export the updater metrics in Prometheus text format
pub fn metrics_text() -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode updater metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("updater metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Drop every series labelled with `updater`, once the instance is gone
pub(crate) fn remove_updater_metrics(updater: &str) {
    let labels = [updater];
    for vec in [
        &*SNAPSHOT_COPIES_TOTAL,
        &*SNAPSHOT_CAP_WAITS_TOTAL,
        &*UPDATES_APPLIED_TOTAL,
        &*BUSY_CHANNEL_RETRIES_TOTAL,
        &*QUEUE_FULL_TOTAL,
    ] {
        let _ = vec.remove_label_values(&labels);
    }
    for vec in [&*LIVE_COPIES, &*DEFERRED_UPDATES, &*CLIENT_CHANNELS] {
        let _ = vec.remove_label_values(&labels);
    }
}

/// The series of one updater instance, resolved once
#[derive(Clone)]
pub(crate) struct UpdaterMetrics {
    pub(crate) copies: IntCounter,
    pub(crate) cap_waits: IntCounter,
    pub(crate) updates_applied: IntCounter,
    pub(crate) busy_retries: IntCounter,
    pub(crate) queue_full: IntCounter,
    pub(crate) live_copies: IntGauge,
    pub(crate) deferred_updates: IntGauge,
    pub(crate) client_channels: IntGauge,
}

impl UpdaterMetrics {
    pub(crate) fn new(updater: &str) -> Self {
        // Touch the registry so the series are exported from the start
        lazy_static::initialize(&REGISTRY);

        let labels = [updater];
        Self {
            copies: SNAPSHOT_COPIES_TOTAL.with_label_values(&labels),
            cap_waits: SNAPSHOT_CAP_WAITS_TOTAL.with_label_values(&labels),
            updates_applied: UPDATES_APPLIED_TOTAL.with_label_values(&labels),
            busy_retries: BUSY_CHANNEL_RETRIES_TOTAL.with_label_values(&labels),
            queue_full: QUEUE_FULL_TOTAL.with_label_values(&labels),
            live_copies: LIVE_COPIES.with_label_values(&labels),
            deferred_updates: DEFERRED_UPDATES.with_label_values(&labels),
            client_channels: CLIENT_CHANNELS.with_label_values(&labels),
        }
    }
}
