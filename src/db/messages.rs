use chrono::NaiveDateTime;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error::AppError;
use crate::models::message::{Message, MessageRef, OutgoingMessage};
use crate::models::new_id;

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        image: row.get("image"),
        date_time: row.get("date_time"),
        reply_content: row.get("reply_content"),
        reply_sender_id: row.get("reply_sender_id"),
        likes: row.get("likes"),
        is_liked: row.get("is_liked"),
    }
}

fn row_to_ref(row: sqlx::sqlite::SqliteRow) -> MessageRef {
    MessageRef {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender_id: row.get("sender_id"),
    }
}

/// Message columns plus like totals; the viewer binds to the first placeholder.
const SELECT_MESSAGES: &str = "SELECT m.id, m.sender_id, m.content, m.image, m.date_time, \
     m.reply_content, m.reply_sender_id, \
     (SELECT COUNT(*) FROM likes l WHERE l.message_id = m.id) AS likes, \
     EXISTS(SELECT 1 FROM likes l WHERE l.message_id = m.id AND l.user_id = ?) AS is_liked \
     FROM messages m";

pub async fn get_message_ref<'e, E>(executor: E, message_id: &str) -> Result<MessageRef, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, chat_id, sender_id FROM messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown message".to_string()))?;

    Ok(row_to_ref(row))
}

/// Refs for the given ids that belong to `chat_id`. Ids from other chats are left out.
pub async fn refs_in_chat<'e, E>(
    executor: E,
    chat_id: &str,
    message_ids: &[String],
) -> Result<Vec<MessageRef>, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; message_ids.len()].join(", ");
    let sql = format!(
        "SELECT id, chat_id, sender_id FROM messages WHERE chat_id = ? AND id IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(chat_id);
    for id in message_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(executor).await?;

    Ok(rows.into_iter().map(row_to_ref).collect())
}

/// Newest first, strictly older than `before`.
pub async fn list_messages(
    pool: &SqlitePool,
    chat_id: &str,
    viewer_id: &str,
    before: NaiveDateTime,
    limit: i64,
) -> Result<Vec<Message>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_MESSAGES} WHERE m.chat_id = ? AND m.date_time < ? ORDER BY m.date_time DESC LIMIT ?"
    ))
    .bind(viewer_id)
    .bind(chat_id)
    .bind(before)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_message).collect())
}

/// Insert a message and bump the unread counter of every other member.
pub async fn insert_message(
    conn: &mut SqliteConnection,
    sender_id: &str,
    input: &OutgoingMessage,
    reply_sender_id: Option<&str>,
    date_time: NaiveDateTime,
) -> Result<Message, AppError> {
    let id = new_id();

    sqlx::query(
        "UPDATE chat_members SET unread_count = unread_count + 1 WHERE chat_id = ? AND user_id != ?",
    )
    .bind(&input.chat_id)
    .bind(sender_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO messages (id, chat_id, sender_id, content, image, date_time, reply_content, reply_sender_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.chat_id)
    .bind(sender_id)
    .bind(&input.content)
    .bind(&input.image)
    .bind(date_time)
    .bind(&input.reply_content)
    .bind(reply_sender_id)
    .execute(&mut *conn)
    .await?;

    Ok(Message {
        id,
        sender_id: Some(sender_id.to_string()),
        content: input.content.clone(),
        image: input.image.clone(),
        date_time,
        reply_content: input.reply_content.clone(),
        reply_sender_id: reply_sender_id.map(str::to_string),
        likes: 0,
        is_liked: false,
    })
}

/// Flip the user's like on a message and return the new state.
pub async fn toggle_like(
    conn: &mut SqliteConnection,
    message_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    let removed = sqlx::query("DELETE FROM likes WHERE message_id = ? AND user_id = ?")
        .bind(message_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO likes (message_id, user_id) VALUES (?, ?)")
        .bind(message_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

pub async fn delete_messages(
    conn: &mut SqliteConnection,
    chat_id: &str,
    message_ids: &[String],
) -> Result<u64, AppError> {
    let mut deleted = 0;
    for id in message_ids {
        let result = sqlx::query("DELETE FROM messages WHERE id = ? AND chat_id = ?")
            .bind(id)
            .bind(chat_id)
            .execute(&mut *conn)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}
