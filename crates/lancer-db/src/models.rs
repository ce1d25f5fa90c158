//! Database row types — these map directly to SQLite rows.
//! Distinct from the lancer-types API models to keep the DB layer
//! independent; `into_*` conversions bridge the two.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use lancer_types::api::ChatParticipant;
use lancer_types::models::{Chat, FileMeta, Message, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub last_message_id: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

pub struct ParticipantRow {
    pub user_id: String,
    pub username: String,
    pub online: bool,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub file_content_type: Option<String>,
    pub file_size: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

pub struct FileRow {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub data: Vec<u8>,
    pub created_at: String,
}

/// A file blob about to be persisted alongside its message.
pub struct NewFile<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub size: i64,
    pub data: &'a [u8],
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: parse_uuid(&self.id, "user id"),
            username: self.username,
            online: self.online,
            last_seen: self.last_seen.as_deref().map(parse_ts),
            created_at: parse_ts(&self.created_at),
        }
    }
}

impl ChatRow {
    pub fn into_chat(self) -> Chat {
        Chat {
            id: parse_uuid(&self.id, "chat id"),
            name: self.name,
            is_group: self.is_group,
            last_message_id: self
                .last_message_id
                .as_deref()
                .map(|id| parse_uuid(id, "last_message_id")),
            last_message_at: self.last_message_at.as_deref().map(parse_ts),
            created_at: parse_ts(&self.created_at),
        }
    }
}

impl ParticipantRow {
    pub fn into_participant(self) -> ChatParticipant {
        ChatParticipant {
            user_id: parse_uuid(&self.user_id, "participant user id"),
            username: self.username,
            online: self.online,
        }
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let file = match (&self.file_id, &self.file_name, &self.file_content_type) {
            (Some(id), Some(filename), Some(content_type)) => Some(FileMeta {
                id: parse_uuid(id, "file id"),
                filename: filename.clone(),
                content_type: content_type.clone(),
                size: self.file_size.unwrap_or(0),
            }),
            _ => None,
        };

        Message {
            id: parse_uuid(&self.id, "message id"),
            chat_id: parse_uuid(&self.chat_id, "chat_id"),
            sender_id: parse_uuid(&self.sender_id, "sender_id"),
            sender_username: self.sender_username,
            content: self.content,
            file,
            is_read: self.is_read,
            created_at: parse_ts(&self.created_at),
            updated_at: self.updated_at.as_deref().map(parse_ts),
        }
    }
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite DEFAULT timestamps are "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
