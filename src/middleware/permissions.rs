use sqlx::Sqlite;

use crate::db;
use crate::error::AppError;
use crate::models::chat::{ChatMember, ChatType};

/// Membership row of `user_id` in `chat_id`, or 403.
pub async fn require_membership<'e, E>(
    executor: E,
    chat_id: &str,
    user_id: &str,
) -> Result<ChatMember, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    db::chats::get_member(executor, chat_id, user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("not a member of this chat".into()))
}

pub async fn require_admin<'e, E>(
    executor: E,
    chat_id: &str,
    user_id: &str,
) -> Result<ChatMember, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let member = require_membership(executor, chat_id, user_id).await?;
    if !member.is_admin {
        return Err(AppError::Forbidden("chat admin privileges required".into()));
    }
    Ok(member)
}

/// Only admins speak in channels.
pub fn can_post(chat_type: ChatType, member: &ChatMember) -> bool {
    chat_type != ChatType::Channel || member.is_admin
}

/// Admins delete anything; in groups senders may also delete their own messages.
pub fn can_delete(chat_type: ChatType, member: &ChatMember, sender_id: Option<&str>) -> bool {
    member.is_admin
        || (chat_type == ChatType::Group && sender_id == Some(member.user_id.as_str()))
}
