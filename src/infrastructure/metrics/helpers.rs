//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    AUTH_OUTCOMES_TOTAL, DISPATCHES_TOTAL, DISPATCH_NO_TARGETS_TOTAL, MESSAGES_DELIVERED_TOTAL,
    MESSAGES_FAILED_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }
}

/// Helper struct for recording authentication metrics
pub struct AuthMetrics;

impl AuthMetrics {
    pub fn record_accepted() {
        AUTH_OUTCOMES_TOTAL.with_label_values(&["accepted"]).inc();
    }

    pub fn record_rejected(reason: &str) {
        AUTH_OUTCOMES_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a dispatch request by target class ("user", "site", "company")
    pub fn record_dispatch(target: &str) {
        DISPATCHES_TOTAL.with_label_values(&[target]).inc();
    }

    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        MESSAGES_FAILED_TOTAL.inc_by(count);
    }

    pub fn record_no_targets() {
        DISPATCH_NO_TARGETS_TOTAL.inc();
    }
}
