//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Handle for a single authenticated WebSocket connection.
///
/// `enabled_events` is computed once at authentication time and never
/// changes for the lifetime of the entry; a client changes preferences by
/// reconnecting.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    pub site_id: String,
    pub company_id: String,
    pub enabled_events: HashSet<String>,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
}

impl ConnectionHandle {
    pub fn new(
        user_id: String,
        site_id: String,
        company_id: String,
        enabled_events: HashSet<String>,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            site_id,
            company_id,
            enabled_events,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Whether this connection wants to receive the given event
    pub fn is_event_enabled(&self, event_cmd: &str) -> bool {
        self.enabled_events.contains(event_cmd)
    }

    /// Whether the receiving side of the connection channel is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a ServerMessage (will be serialized when sent to WebSocket)
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Send a pre-serialized message (for efficient multi-send scenarios)
    pub async fn send_preserialized(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(message).await
    }
}
