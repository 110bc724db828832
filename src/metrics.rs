//! Service metrics, rendered on `/metrics/prometheus` next to the http ones.

use std::time::Duration;

use axum_prometheus::metrics::{Counter, Gauge, Histogram};

use crate::counter::Visit;

pub const VISITS_RECORDED: &str = "visits_recorded_total";
pub const STORE_ERRORS: &str = "visits_store_errors_total";
pub const CURRENT_VISITS: &str = "visits_current";
pub const STORE_DURATION: &str = "visits_store_duration_seconds";

/// Gets a prometheus counter
pub fn metric_counter(name: &'static str) -> Counter {
    axum_prometheus::metrics::counter!(name)
}

/// Gets a prometheus gauge
pub fn metric_gauge(name: &'static str) -> Gauge {
    axum_prometheus::metrics::gauge!(name)
}

/// Gets a prometheus histogram
pub fn metric_histogram(name: &'static str) -> Histogram {
    axum_prometheus::metrics::histogram!(name)
}

pub fn record_visit(visit: &Visit, elapsed: Duration) {
    metric_counter(VISITS_RECORDED).increment(1);
    metric_gauge(CURRENT_VISITS).set(visit.current as f64);
    metric_histogram(STORE_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_store_error(elapsed: Duration) {
    metric_counter(STORE_ERRORS).increment(1);
    metric_histogram(STORE_DURATION).record(elapsed.as_secs_f64());
}
