use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// A user's presence as observed by other users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A user came online or went offline
    UserStatusChanged {
        user_id: Uuid,
        username: String,
        status: PresenceStatus,
    },

    /// A message was posted to a chat the recipient participates in
    Message(Message),

    /// Something went wrong with the sender's last command; delivered to
    /// the sender only, never fanned out
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Send a text message to a chat
    SendMessage { chat_id: Uuid, text: String },

    /// Send a file to a chat. `data` is the base64-encoded payload; `size`
    /// is the declared decoded length and must match.
    SendFile {
        chat_id: Uuid,
        filename: String,
        content_type: String,
        size: i64,
        data: String,
    },
}
