//! API layer - HTTP endpoint handlers.

mod handlers;
mod health;
mod metrics;
mod routes;

pub use handlers::{submit_notification, SubmitNotificationRequest, SubmitNotificationResponse, TargetKind};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
