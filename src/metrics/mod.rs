use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

use crate::Error;
use crate::StoreError;


lazy_static! {
    pub static ref EVENTS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("dconfig_events_applied_total", "Watch events applied to the typed cache"),
        &["shape", "kind"]
    )
    .expect("metric can not be created");

    pub static ref DECODE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("dconfig_decode_failures_total", "Values dropped because they failed to decode"),
        &["shape"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATIONS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("dconfig_notifications_total", "Prefix watcher callbacks invoked"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("dconfig_active_watches", "Watch loops currently streaming"),
        &["module"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_LAGGED_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("dconfig_watch_lagged_events_total", "Events the store dropped for a lagging watch"),
        &["module", "prefix"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the crate collectors with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(EVENTS_APPLIED.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(DECODE_FAILURES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_DELIVERED.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(ACTIVE_WATCHES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(WATCH_LAGGED_EVENTS.clone()))
            .expect("collector can be registered");
    });
}

/// Renders [`REGISTRY`] in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::new()
        }
    }
}

/// Counts the events a lagging watch lost. Returns the skipped count when
/// `error` is a lag report.
pub(crate) fn record_watch_lag(
    module: &str,
    prefix: &str,
    error: &Error,
) -> Option<u64> {
    match error {
        Error::Store(StoreError::WatchLagged { skipped, .. }) => {
            WATCH_LAGGED_EVENTS.with_label_values(&[module, prefix]).inc_by(*skipped);
            Some(*skipped)
        }
        _ => None,
    }
}
