use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::handlers::submit_notification;
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Notification submission
        .nest(
            "/api/v1",
            Router::new().route("/notifications", post(submit_notification)),
        )
}
