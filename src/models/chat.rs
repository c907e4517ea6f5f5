use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one chat. The only scope in which presence is visible.
    Chat,
    Group,
    Channel,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Chat => "chat",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(ChatType::Chat),
            "group" => Some(ChatType::Group),
            "channel" => Some(ChatType::Channel),
            _ => None,
        }
    }
}

/// A chat as seen by one particular member: `key`, `is_admin` and
/// `unread_count` belong to that member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub companion_id: Option<String>,
    pub is_private: bool,
    pub members_count: i64,
    pub last_reading: NaiveDateTime,
    pub message_content: Option<String>,
    pub message_datetime: Option<NaiveDateTime>,
    pub message_sender_id: Option<String>,
    pub is_admin: bool,
    pub key: Option<String>,
    pub unread_count: i64,
}

/// Row from the `chats` table.
#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: bool,
    pub members_count: i64,
    pub last_reading: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberInput {
    pub id: String,
    pub key: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateChat {
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    pub my_key: Option<String>,
    pub members: Vec<ChatMemberInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChat {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// One row of `chat_members`.
#[derive(Debug, Clone)]
pub struct ChatMember {
    pub user_id: String,
    pub is_admin: bool,
    pub key: Option<String>,
    pub unread_count: i64,
}
