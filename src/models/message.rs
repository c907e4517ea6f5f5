use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// `None` once the sender's account has been deleted.
    pub sender_id: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub date_time: NaiveDateTime,
    pub reply_content: Option<String>,
    pub reply_sender_id: Option<String>,
    pub likes: i64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub content: String,
    pub image: Option<String>,
    pub reply_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessages {
    pub messages: Vec<OutgoingMessage>,
    pub reply_sender_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessages {
    pub message_ids: Vec<String>,
}

/// Minimal view of a message used for permission checks.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub id: String,
    pub chat_id: String,
    pub sender_id: Option<String>,
}
