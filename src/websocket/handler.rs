use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{AuthOutcome, ConnectParams, RejectReason};
use crate::connection_manager::ConnectionHandle;
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;

use super::message::OutboundMessage;

const CHANNEL_BUFFER_SIZE: usize = 32;

/// Identity query parameters carried on the handshake
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// User id
    pub asp: Option<String>,
    /// Site id
    pub site: Option<String>,
    /// Company id
    pub societe: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Authentication runs BEFORE the upgrade is accepted; a rejected
/// handshake never becomes a socket.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(user_id = query.asp.as_deref().unwrap_or(""))
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let params = ConnectParams::new(
        query.asp.unwrap_or_default(),
        query.site.unwrap_or_default(),
        query.societe.unwrap_or_default(),
    );

    // The channel exists before the socket so the gate can hand the sender
    // to the registry; frames buffer until the socket task starts draining.
    let (tx, rx) = mpsc::channel::<OutboundMessage>(CHANNEL_BUFFER_SIZE);

    match state.auth_gate.authenticate(params, tx).await {
        AuthOutcome::Accepted(handle) => {
            tracing::info!(
                connection_id = %handle.id,
                user_id = %handle.user_id,
                "WebSocket upgrade accepted"
            );
            ws.on_upgrade(move |socket| handle_socket(socket, state, handle, rx))
        }
        AuthOutcome::Rejected(reason) => {
            tracing::warn!(reason = %reason, "WebSocket admission rejected");
            let status = match reason {
                RejectReason::MissingParams => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, reason.to_string()).into_response()
        }
    }
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, handle, rx),
    fields(
        connection_id = %handle.id,
        user_id = %handle.user_id
    )
)]
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    handle: Arc<ConnectionHandle>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    let connection_id = handle.id;
    let user_id = handle.user_id.clone();
    let connection_start = std::time::Instant::now();

    ConnectionMetrics::record_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            // Pre-serialized messages avoid the serialization cost here
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving frames from WebSocket; the relay is push-only, so
    // inbound traffic only feeds the activity clock and close detection.
    let recv_handle = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &recv_handle) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %recv_handle.id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Disconnect: tear down only our own entry. A duplicate signal, or one
    // arriving after the user reconnected, is a no-op.
    if state
        .registry
        .unregister_connection(&user_id, connection_id)
        .is_none()
    {
        tracing::debug!(
            connection_id = %connection_id,
            user_id = %user_id,
            "Connection already unregistered or replaced"
        );
    }

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
fn process_frame(msg: Message, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(_) | Message::Binary(_) => {
            handle.update_activity();
            tracing::debug!(
                connection_id = %handle.id,
                "Ignoring inbound frame on push-only connection"
            );
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
