use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::chat::Chat;
use crate::models::message::Message;

/// Server-to-client notification. Frames carry no envelope; the variant is
/// named by the `notifi_type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notifi_type", rename_all = "snake_case")]
pub enum Event {
    NewMessage {
        chat_id: String,
        message: Message,
    },
    DeletedMessages {
        chat_id: String,
        message_ids: Vec<String>,
    },
    NewLike {
        chat_id: String,
        message_id: String,
        is_liked: bool,
    },
    NewChat {
        chat: Chat,
    },
    DeletedChat {
        chat_id: String,
    },
    DeletedUser {
        user_id: String,
    },
    NewStatus {
        user_id: String,
        is_online: bool,
    },
    NewWriting {
        user_id: String,
        chat_id: String,
        is_writing: bool,
    },
    ReadedMessages {
        chat_id: String,
        last_reading: NaiveDateTime,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewMessage { .. } => "new_message",
            Event::DeletedMessages { .. } => "deleted_messages",
            Event::NewLike { .. } => "new_like",
            Event::NewChat { .. } => "new_chat",
            Event::DeletedChat { .. } => "deleted_chat",
            Event::DeletedUser { .. } => "deleted_user",
            Event::NewStatus { .. } => "new_status",
            Event::NewWriting { .. } => "new_writing",
            Event::ReadedMessages { .. } => "readed_messages",
        }
    }
}

/// First frame a client must send.
#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub user_id: String,
    pub token: String,
}

/// Sent once before the server closes a connection it refused.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorFrame {
    pub message: String,
    pub status: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Wrong parameters")]
    InvalidPayload,
    #[error("Wrong token")]
    Unauthorized,
    #[error("no auth frame before timeout")]
    TimedOut,
    #[error("client went away during handshake")]
    Disconnected,
}

impl HandshakeError {
    /// Frame to send before closing, if the client should be told why.
    pub fn frame(&self) -> Option<ErrorFrame> {
        let status = match self {
            HandshakeError::InvalidPayload => 400,
            HandshakeError::Unauthorized => 401,
            HandshakeError::TimedOut | HandshakeError::Disconnected => return None,
        };
        Some(ErrorFrame {
            message: self.to_string(),
            status,
        })
    }
}
