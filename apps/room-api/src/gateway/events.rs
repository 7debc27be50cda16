//! Gateway event names and wire-format messages.
//!
//! Every frame in either direction is a JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::presence::Participant;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names used on the wire.
pub struct EventName;

impl EventName {
    // Client → server.
    pub const JOIN_ROOM: &'static str = "join-room";
    pub const LEAVE_ROOM: &'static str = "leave-room";
    pub const CODE_CHANGE: &'static str = "code-change";
    pub const CURSOR_MOVE: &'static str = "cursor-move";

    // Both directions.
    pub const LANGUAGE_CHANGE: &'static str = "language-change";
    pub const THEME_CHANGE: &'static str = "theme-change";
    pub const CHAT_MESSAGE: &'static str = "chat-message";

    // Server → client.
    pub const USER_LIST: &'static str = "user-list";
    pub const ROOM_FULL: &'static str = "room-full";
    pub const CODE_UPDATE: &'static str = "code-update";
    pub const CURSOR_UPDATE: &'static str = "cursor-update";
    pub const USER_LEFT: &'static str = "user-left";
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayMessage {
    pub event: String,
    pub data: Value,
}

impl GatewayMessage {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// Full population of a room, in join order.
    pub fn user_list(participants: &[Participant]) -> Self {
        Self::new(
            EventName::USER_LIST,
            serde_json::to_value(participants).unwrap_or_else(|_| Value::Array(Vec::new())),
        )
    }

    pub fn room_full() -> Self {
        Self::new(EventName::ROOM_FULL, serde_json::json!({}))
    }

    pub fn code_update(code: &str) -> Self {
        Self::new(EventName::CODE_UPDATE, serde_json::json!({ "code": code }))
    }

    pub fn language_change(language: &str) -> Self {
        Self::new(
            EventName::LANGUAGE_CHANGE,
            serde_json::json!({ "language": language }),
        )
    }

    pub fn theme_change(theme: &str) -> Self {
        Self::new(EventName::THEME_CHANGE, serde_json::json!({ "theme": theme }))
    }

    pub fn cursor_update(user_id: &str, position: Value) -> Self {
        Self::new(
            EventName::CURSOR_UPDATE,
            serde_json::json!({ "userId": user_id, "position": position }),
        )
    }

    pub fn user_left(user_id: &str) -> Self {
        Self::new(EventName::USER_LEFT, serde_json::json!({ "userId": user_id }))
    }

    pub fn chat_message(
        nickname: &str,
        color: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            EventName::CHAT_MESSAGE,
            serde_json::json!({
                "nickname": nickname,
                "color": color,
                "message": message,
                "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        )
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_code: String,
    pub nickname: String,
}

/// `leave-room` carries either `{"roomCode": "ABCD"}` or the bare code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LeaveRoomPayload {
    Code(String),
    #[serde(rename_all = "camelCase")]
    Object { room_code: String },
}

impl LeaveRoomPayload {
    pub fn room_code(&self) -> &str {
        match self {
            Self::Code(code) => code,
            Self::Object { room_code } => room_code,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChangePayload {
    pub room_code: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageChangePayload {
    pub room_code: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeChangePayload {
    pub room_code: String,
    pub theme: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovePayload {
    pub room_code: String,
    #[serde(default)]
    pub position: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub room_code: String,
    pub nickname: String,
    pub color: String,
    pub message: String,
}
