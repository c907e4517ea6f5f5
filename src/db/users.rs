use chrono::NaiveDateTime;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::error::AppError;
use crate::models::user::{CreateUser, UserRow};
use crate::models::{new_id, now};

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> UserRow {
    UserRow {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        nickname: row.get("nickname"),
        pub_key: row.get("pub_key"),
        priv_key: row.get("priv_key"),
        last_seen: row.get("last_seen"),
        latest_key_update: row.get("latest_key_update"),
    }
}

const SELECT_USERS: &str = "SELECT id, email, password_hash, name, nickname, pub_key, priv_key, last_seen, latest_key_update FROM users";

pub async fn get_user<'e, E>(executor: E, user_id: &str) -> Result<UserRow, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("{SELECT_USERS} WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown user".to_string()))?;

    Ok(row_to_user(row))
}

pub async fn get_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<UserRow>, AppError> {
    let row = sqlx::query(&format!("{SELECT_USERS} WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_user))
}

pub async fn get_users(pool: &SqlitePool, ids: &[String]) -> Result<Vec<UserRow>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("{SELECT_USERS} WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(row_to_user).collect())
}

pub async fn user_exists<'e, E>(executor: E, user_id: &str) -> Result<bool, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

/// Email or nickname already taken by someone.
pub async fn is_taken(pool: &SqlitePool, email: &str, nickname: &str) -> Result<bool, AppError> {
    let row = sqlx::query("SELECT 1 FROM users WHERE email = ? OR nickname = ?")
        .bind(email)
        .bind(nickname)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn create_user(pool: &SqlitePool, input: &CreateUser) -> Result<UserRow, AppError> {
    let id = new_id();
    let timestamp = now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, nickname, pub_key, priv_key, last_seen, latest_key_update) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(&input.name)
    .bind(&input.nickname)
    .bind(&input.pub_key)
    .bind(&input.priv_key)
    .bind(timestamp)
    .bind(timestamp)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("email or nickname already taken".to_string())
        }
        _ => AppError::Database(e),
    })?;

    get_user(pool, &id).await
}

pub async fn touch_last_seen(
    pool: &SqlitePool,
    user_id: &str,
    at: NaiveDateTime,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET last_seen = ? WHERE id = ?")
        .bind(at)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Public keys of the given users, unknown ids skipped.
pub async fn pub_keys(pool: &SqlitePool, ids: &[String]) -> Result<HashMap<String, String>, AppError> {
    Ok(get_users(pool, ids)
        .await?
        .into_iter()
        .map(|row| (row.id, row.pub_key))
        .collect())
}

/// Replace the user's key pair and their copy of each listed chat key.
/// Chats the user is not a member of are left untouched.
pub async fn update_keys(
    conn: &mut SqliteConnection,
    user_id: &str,
    pub_key: &str,
    priv_key: &str,
    chat_keys: &HashMap<String, String>,
    at: NaiveDateTime,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE users SET pub_key = ?, priv_key = ?, latest_key_update = ? WHERE id = ?",
    )
    .bind(pub_key)
    .bind(priv_key)
    .bind(at)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown user".to_string()));
    }

    for (chat_id, key) in chat_keys {
        sqlx::query("UPDATE chat_members SET key = ? WHERE chat_id = ? AND user_id = ?")
            .bind(key)
            .bind(chat_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// The private key is stored encrypted with the password, so both change together.
pub async fn update_password(
    pool: &SqlitePool,
    user_id: &str,
    password_hash: &str,
    priv_key: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET password_hash = ?, priv_key = ? WHERE id = ?")
        .bind(password_hash)
        .bind(priv_key)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove a user inside a transaction. Chats they belonged to lose one member;
/// memberships and likes cascade, authored messages keep a null sender.
pub async fn delete_user(conn: &mut SqliteConnection, user_id: &str) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE chats SET members_count = members_count - 1 \
         WHERE id IN (SELECT chat_id FROM chat_members WHERE user_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown user".to_string()));
    }
    Ok(())
}
