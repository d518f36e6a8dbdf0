//! Prometheus metrics for the notification relay.
//!
//! This module provides metrics for monitoring the relay:
//! - Connection metrics (active connections, open/close counts, duration)
//! - Authentication metrics (outcomes by reason)
//! - Dispatch metrics (requests by target class, delivered/failed counts)

mod helpers;

pub use helpers::{encode_metrics, AuthMetrics, ConnectionMetrics, DispatchMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently registered WebSocket connections"
    ).unwrap();

    /// Total WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket connection duration in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Authentication Metrics
    // ============================================================================

    /// Authentication outcomes by result
    pub static ref AUTH_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_auth_outcomes_total", METRIC_PREFIX),
        "Authentication attempts by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Total dispatch requests by target class
    pub static ref DISPATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatches_total", METRIC_PREFIX),
        "Total dispatch requests",
        &["target"]
    ).unwrap();

    /// Total messages delivered to connections
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages successfully handed to connection channels"
    ).unwrap();

    /// Total message delivery failures
    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total message delivery failures"
    ).unwrap();

    /// Dispatches that matched no eligible recipient
    pub static ref DISPATCH_NO_TARGETS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dispatch_no_targets_total", METRIC_PREFIX),
        "Dispatch requests that matched zero eligible recipients"
    ).unwrap();
}
