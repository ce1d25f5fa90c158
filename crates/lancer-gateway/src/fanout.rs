use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use lancer_db::models::NewFile;
use lancer_types::events::GatewayEvent;
use lancer_types::models::{FileMeta, Message};

use crate::dispatcher::Dispatcher;

/// 10 MB cap for file payloads sent over the gateway
const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Why a send was refused. Authorization and validation failures carry
/// their own wording; storage failures surface to the sender as a generic
/// message while the cause goes to the server log.
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("you are not a participant of this chat")]
    NotParticipant,

    #[error("{0}")]
    Invalid(String),

    #[error("internal error")]
    Storage(anyhow::Error),
}

impl Dispatcher {
    /// Persist a text message and deliver it to every participant of the
    /// chat with a live connection. Participants without one are silently
    /// skipped — best-effort live delivery, no queue, no replay.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        sender_username: &str,
        chat_id: Uuid,
        text: String,
    ) -> Result<Message, FanoutError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(FanoutError::Invalid("message text must not be empty".into()));
        }

        let recipients = self.chat_recipients(chat_id, sender_id).await?;

        let message_id = Uuid::new_v4();
        let created_at = Utc::now();
        let ts = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        {
            let content = text.clone();
            let ts = ts.clone();
            self.blocking(move |db| {
                db.insert_message(
                    &message_id.to_string(),
                    &chat_id.to_string(),
                    &sender_id.to_string(),
                    &content,
                    None,
                    &ts,
                )
            })
            .await?;
        }

        let message = Message {
            id: message_id,
            chat_id,
            sender_id,
            sender_username: sender_username.to_string(),
            content: text,
            file: None,
            is_read: false,
            created_at,
            updated_at: None,
        };

        self.deliver(&recipients, message.clone()).await;
        Ok(message)
    }

    /// Persist a file message: blob record, message row and chat pointer
    /// commit as one transaction. The fan-out event carries metadata only;
    /// clients download the blob via the REST layer.
    pub async fn send_file(
        &self,
        sender_id: Uuid,
        sender_username: &str,
        chat_id: Uuid,
        filename: String,
        content_type: String,
        size: i64,
        data: String,
    ) -> Result<Message, FanoutError> {
        if filename.trim().is_empty() {
            return Err(FanoutError::Invalid("filename must not be empty".into()));
        }

        let bytes = B64
            .decode(data.as_bytes())
            .map_err(|_| FanoutError::Invalid("file data is not valid base64".into()))?;

        if bytes.is_empty() {
            return Err(FanoutError::Invalid("file payload is empty".into()));
        }
        if bytes.len() > MAX_FILE_SIZE {
            return Err(FanoutError::Invalid(format!(
                "file exceeds the {} MB limit",
                MAX_FILE_SIZE / 1024 / 1024
            )));
        }
        if bytes.len() as i64 != size {
            return Err(FanoutError::Invalid(
                "declared size does not match payload".into(),
            ));
        }

        let recipients = self.chat_recipients(chat_id, sender_id).await?;

        let message_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let created_at = Utc::now();
        let ts = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let content = format!("File: {}", filename);

        {
            let filename = filename.clone();
            let content_type = content_type.clone();
            let content = content.clone();
            self.blocking(move |db| {
                db.insert_file_message(
                    &NewFile {
                        id: &file_id.to_string(),
                        owner_id: &sender_id.to_string(),
                        filename: &filename,
                        content_type: &content_type,
                        size,
                        data: &bytes,
                    },
                    &message_id.to_string(),
                    &chat_id.to_string(),
                    &sender_id.to_string(),
                    &content,
                    &ts,
                )
            })
            .await?;
        }

        let message = Message {
            id: message_id,
            chat_id,
            sender_id,
            sender_username: sender_username.to_string(),
            content,
            file: Some(FileMeta {
                id: file_id,
                filename,
                content_type,
                size,
            }),
            is_read: false,
            created_at,
            updated_at: None,
        };

        self.deliver(&recipients, message.clone()).await;
        Ok(message)
    }

    /// Membership check and recipient resolution in one read, before any
    /// persistence. Once the insert commits there is no fallible store
    /// access left on the send path, so an error returned to the sender
    /// always means the message was not stored.
    async fn chat_recipients(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
    ) -> Result<Vec<Uuid>, FanoutError> {
        let ids = self
            .blocking(move |db| db.participant_ids(&chat_id.to_string()))
            .await?;

        let mut recipients = Vec::with_capacity(ids.len());
        for raw_id in ids {
            match raw_id.parse::<Uuid>() {
                Ok(id) => recipients.push(id),
                Err(_) => warn!("Corrupt participant id '{}' in chat {}", raw_id, chat_id),
            }
        }

        if !recipients.contains(&sender_id) {
            return Err(FanoutError::NotParticipant);
        }
        Ok(recipients)
    }

    /// Deliver to whoever is registered. Delivery order across
    /// participants is unspecified.
    async fn deliver(&self, recipients: &[Uuid], message: Message) {
        let event = GatewayEvent::Message(message);
        for user_id in recipients {
            self.registry().send_to(*user_id, event.clone()).await;
        }
    }
}
