use chrono::NaiveDateTime;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error::AppError;
use crate::models::chat::{Chat, ChatMember, ChatMemberInput, ChatRow, ChatType};
use crate::models::new_id;

fn parse_type(value: &str) -> Result<ChatType, AppError> {
    ChatType::parse(value).ok_or_else(|| AppError::Internal(format!("unknown chat type {value}")))
}

fn row_to_chat_row(row: sqlx::sqlite::SqliteRow) -> Result<ChatRow, AppError> {
    let chat_type: String = row.get("type");
    Ok(ChatRow {
        id: row.get("id"),
        chat_type: parse_type(&chat_type)?,
        name: row.get("name"),
        description: row.get("description"),
        is_private: row.get("is_private"),
        members_count: row.get("members_count"),
        last_reading: row.get("last_reading"),
    })
}

fn row_to_chat(row: sqlx::sqlite::SqliteRow) -> Result<Chat, AppError> {
    let chat_type: String = row.get("type");
    Ok(Chat {
        id: row.get("id"),
        chat_type: parse_type(&chat_type)?,
        name: row.get("name"),
        description: row.get("description"),
        companion_id: row.get("companion_id"),
        is_private: row.get("is_private"),
        members_count: row.get("members_count"),
        last_reading: row.get("last_reading"),
        message_content: row.get("message_content"),
        message_datetime: row.get("message_datetime"),
        message_sender_id: row.get("message_sender_id"),
        is_admin: row.get("is_admin"),
        key: row.get("key"),
        unread_count: row.get("unread_count"),
    })
}

fn row_to_member(row: sqlx::sqlite::SqliteRow) -> ChatMember {
    ChatMember {
        user_id: row.get("user_id"),
        is_admin: row.get("is_admin"),
        key: row.get("key"),
        unread_count: row.get("unread_count"),
    }
}

const SELECT_CHATS: &str =
    "SELECT id, type, name, description, is_private, members_count, last_reading FROM chats";

/// Chat as seen by the member bound to the first placeholder.
const SELECT_SNAPSHOTS: &str = "SELECT c.id, c.type, c.name, c.description, c.is_private, \
     c.members_count, c.last_reading, cm.is_admin, cm.key, cm.unread_count, \
     CASE WHEN c.type = 'chat' THEN \
         (SELECT o.user_id FROM chat_members o WHERE o.chat_id = c.id AND o.user_id != cm.user_id LIMIT 1) \
     END AS companion_id, \
     m.content AS message_content, m.date_time AS message_datetime, m.sender_id AS message_sender_id \
     FROM chat_members cm \
     JOIN chats c ON c.id = cm.chat_id \
     LEFT JOIN messages m ON m.id = \
         (SELECT l.id FROM messages l WHERE l.chat_id = c.id ORDER BY l.date_time DESC LIMIT 1) \
     WHERE cm.user_id = ?";

pub async fn get_chat<'e, E>(executor: E, chat_id: &str) -> Result<ChatRow, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("{SELECT_CHATS} WHERE id = ?"))
        .bind(chat_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown chat".to_string()))?;

    row_to_chat_row(row)
}

pub async fn get_member<'e, E>(
    executor: E,
    chat_id: &str,
    user_id: &str,
) -> Result<Option<ChatMember>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT user_id, is_admin, key, unread_count FROM chat_members WHERE chat_id = ? AND user_id = ?",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(row_to_member))
}

pub async fn member_ids<'e, E>(executor: E, chat_id: &str) -> Result<Vec<String>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT user_id FROM chat_members WHERE chat_id = ?")
        .bind(chat_id)
        .fetch_all(executor)
        .await?;

    Ok(rows.into_iter().map(|r| r.get("user_id")).collect())
}

/// Members of every one-to-one chat `user_id` is part of, excluding the user.
pub async fn direct_companions<'e, E>(executor: E, user_id: &str) -> Result<Vec<String>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT DISTINCT o.user_id FROM chat_members cm \
         JOIN chats c ON c.id = cm.chat_id AND c.type = 'chat' \
         JOIN chat_members o ON o.chat_id = cm.chat_id AND o.user_id != cm.user_id \
         WHERE cm.user_id = ?",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|r| r.get("user_id")).collect())
}

pub async fn direct_chat_exists<'e, E>(executor: E, a: &str, b: &str) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT 1 FROM chats c \
         JOIN chat_members ma ON ma.chat_id = c.id AND ma.user_id = ? \
         JOIN chat_members mb ON mb.chat_id = c.id AND mb.user_id = ? \
         WHERE c.type = 'chat' LIMIT 1",
    )
    .bind(a)
    .bind(b)
    .fetch_optional(executor)
    .await?;

    Ok(row.is_some())
}

pub async fn chat_snapshot<'e, E>(executor: E, chat_id: &str, user_id: &str) -> Result<Chat, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("{SELECT_SNAPSHOTS} AND c.id = ?"))
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown chat".to_string()))?;

    row_to_chat(row)
}

/// Chats of a user, most recently active first.
pub async fn list_chats(pool: &SqlitePool, user_id: &str) -> Result<Vec<Chat>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_SNAPSHOTS} ORDER BY COALESCE(m.date_time, c.last_reading) DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_chat).collect()
}

pub struct NewChat<'a> {
    pub chat_type: ChatType,
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub is_private: bool,
    pub created_at: NaiveDateTime,
}

/// Insert a chat with its creator and initial members. Returns the new chat id.
pub async fn create_chat(
    conn: &mut SqliteConnection,
    input: &NewChat<'_>,
    creator: &ChatMemberInput,
    members: &[ChatMemberInput],
) -> Result<String, AppError> {
    let id = new_id();

    sqlx::query(
        "INSERT INTO chats (id, type, name, description, is_private, members_count, last_reading) \
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(input.chat_type.as_str())
    .bind(input.name)
    .bind(input.description)
    .bind(input.is_private)
    .bind(input.created_at)
    .execute(&mut *conn)
    .await?;

    add_members(&mut *conn, &id, std::slice::from_ref(creator)).await?;
    add_members(&mut *conn, &id, members).await?;

    Ok(id)
}

pub async fn update_chat(
    conn: &mut SqliteConnection,
    chat_id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE chats SET name = COALESCE(?, name), description = COALESCE(?, description) WHERE id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(chat_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Memberships and messages go with the chat.
pub async fn delete_chat(conn: &mut SqliteConnection, chat_id: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM chats WHERE id = ?")
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown chat".to_string()));
    }
    Ok(())
}

pub async fn add_members(
    conn: &mut SqliteConnection,
    chat_id: &str,
    members: &[ChatMemberInput],
) -> Result<(), AppError> {
    for member in members {
        sqlx::query(
            "INSERT INTO chat_members (chat_id, user_id, is_admin, key, unread_count) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(chat_id)
        .bind(&member.id)
        .bind(member.is_admin)
        .bind(&member.key)
        .execute(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("user is already a member".to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound("unknown user".to_string())
            }
            _ => AppError::Database(e),
        })?;
    }

    sqlx::query("UPDATE chats SET members_count = members_count + ? WHERE id = ?")
        .bind(members.len() as i64)
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn remove_members(
    conn: &mut SqliteConnection,
    chat_id: &str,
    user_ids: &[String],
) -> Result<(), AppError> {
    for user_id in user_ids {
        let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::BadRequest(format!("{user_id} is not a member")));
        }
    }

    sqlx::query("UPDATE chats SET members_count = members_count - ? WHERE id = ?")
        .bind(user_ids.len() as i64)
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove `user_id` from the chat, deleting the chat once nobody is left.
/// Returns whether the chat was deleted.
pub async fn leave_chat(
    conn: &mut SqliteConnection,
    chat_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    remove_members(&mut *conn, chat_id, &[user_id.to_string()]).await?;

    let remaining: i64 = sqlx::query("SELECT members_count FROM chats WHERE id = ?")
        .bind(chat_id)
        .fetch_one(&mut *conn)
        .await?
        .get("members_count");

    if remaining <= 0 {
        delete_chat(&mut *conn, chat_id).await?;
        return Ok(true);
    }
    Ok(false)
}

/// Reset the reader's unread counter. When the chat holds messages from other
/// senders newer than its `last_reading`, advance it to `at` and return it.
pub async fn mark_read(
    conn: &mut SqliteConnection,
    chat_id: &str,
    user_id: &str,
    at: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, AppError> {
    sqlx::query("UPDATE chat_members SET unread_count = 0 WHERE chat_id = ? AND user_id = ?")
        .bind(chat_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let pending = sqlx::query(
        "SELECT 1 FROM messages m JOIN chats c ON c.id = m.chat_id \
         WHERE m.chat_id = ? AND m.date_time > c.last_reading \
         AND (m.sender_id IS NULL OR m.sender_id != ?) LIMIT 1",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    if pending.is_none() {
        return Ok(None);
    }

    sqlx::query("UPDATE chats SET last_reading = ? WHERE id = ?")
        .bind(at)
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;
    Ok(Some(at))
}
