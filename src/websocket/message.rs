use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "notification")]
    Notification { cmd: String, msg: String },
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn notification(cmd: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Notification {
            cmd: cmd.into(),
            msg: msg.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outbound frame handed to a connection's channel.
///
/// Fan-outs to many connections serialize the frame once and share it;
/// single sends carry the raw message and serialize at the socket task.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<String>),
}

impl OutboundMessage {
    /// Serialize a message once for sharing across a fan-out
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(Arc::new(serde_json::to_string(message)?)))
    }

    /// The JSON text to write to the socket
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Preserialized(json) => Ok(json.as_ref().clone()),
        }
    }
}
