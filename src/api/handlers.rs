//! HTTP notification submission handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::notification::{DispatchRequest, DispatchResult, NotificationTarget};
use crate::server::AppState;

/// Target discriminator accepted on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Site,
    Societe,
    User,
}

impl TargetKind {
    fn into_target(self, id: String) -> NotificationTarget {
        match self {
            TargetKind::User => NotificationTarget::User(id),
            TargetKind::Site => NotificationTarget::Site(id),
            TargetKind::Societe => NotificationTarget::Company(id),
        }
    }
}

/// Request to relay a notification to connected recipients
#[derive(Debug, Deserialize)]
pub struct SubmitNotificationRequest {
    /// Target identity (user, site or company id depending on `target`)
    pub id: String,
    pub target: TargetKind,
    /// Event name the recipients must have enabled
    pub cmd: String,
    /// Message payload forwarded verbatim
    pub msg: String,
}

/// Response for a relayed notification
#[derive(Debug, Serialize)]
pub struct SubmitNotificationResponse {
    pub success: bool,
    /// Number of connections the message was handed to
    pub delivered_to: usize,
    pub timestamp: DateTime<Utc>,
}

/// Accept a producer's notification and relay it.
#[tracing::instrument(
    name = "http.submit_notification",
    skip(state, request),
    fields(
        target = ?request.target,
        target_id = %request.id,
        cmd = %request.cmd
    )
)]
pub async fn submit_notification(
    State(state): State<AppState>,
    Json(request): Json<SubmitNotificationRequest>,
) -> Result<Json<SubmitNotificationResponse>> {
    let dispatch = DispatchRequest {
        target: request.target.into_target(request.id),
        event_cmd: request.cmd,
        message: request.msg,
    };

    match state.dispatcher.dispatch(dispatch).await {
        DispatchResult::Delivered(count) => Ok(Json(SubmitNotificationResponse {
            success: true,
            delivered_to: count,
            timestamp: Utc::now(),
        })),
        DispatchResult::NoTargets => Err(AppError::NotFound(
            "No connected recipients for notification".to_string(),
        )),
        DispatchResult::Invalid => Err(AppError::Validation(
            "id, target, cmd and msg are required and must be non-empty".to_string(),
        )),
    }
}
