//! Wire-format frames exchanged over the chat WebSocket.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::identity::PublicProfile;
use crate::models::message::PublicChatMessage;

/// Inbound frame types the gateway understands.
const CLIENT_FRAME_TYPES: &[&str] = &[
    "auth",
    "world_chat",
    "stream_chat",
    "grotto_chat",
    "join_stream",
    "leave_stream",
    "heartbeat",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid message format")]
    Malformed,
    #[error("Unknown message type")]
    UnknownType(String),
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
    },
    WorldChat {
        message: String,
    },
    StreamChat {
        message: String,
        #[serde(rename = "streamName")]
        stream_name: String,
    },
    GrottoChat {
        message: String,
        participants: Vec<String>,
    },
    JoinStream {
        #[serde(rename = "streamName")]
        stream_name: String,
    },
    LeaveStream {
        #[serde(rename = "streamName")]
        stream_name: String,
    },
    Heartbeat,
}

impl ClientFrame {
    /// Parse and validate one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|_| FrameError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::Malformed)?;

        if !CLIENT_FRAME_TYPES.contains(&kind) {
            return Err(FrameError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|_| FrameError::Malformed)
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    AuthSuccess {
        user: PublicProfile,
    },
    AuthError {
        message: String,
    },
    WorldChatMessage {
        data: PublicChatMessage,
    },
    StreamChatMessage {
        #[serde(rename = "streamName")]
        stream_name: String,
        data: PublicChatMessage,
    },
    GrottoChatMessage {
        participants: Vec<String>,
        data: PublicChatMessage,
    },
    StreamJoined {
        #[serde(rename = "streamName")]
        stream_name: String,
    },
    StreamLeft {
        #[serde(rename = "streamName")]
        stream_name: String,
    },
    HeartbeatAck,
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// Serialize once so a fan-out can share the same text.
    pub fn encode(&self) -> Arc<str> {
        match serde_json::to_string(self) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(?e, "failed to encode server frame");
                Arc::from(r#"{"type":"error","message":"Internal error"}"#)
            }
        }
    }
}

/// Work queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Arc<str>),
    Close { code: u16, reason: &'static str },
}
