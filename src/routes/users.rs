use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::collections::HashMap;

use crate::db;
use crate::error::AppError;
use crate::gateway::events::Event;
use crate::middleware::auth::{hash_password, verify_password, AuthUser};
use crate::models::now;
use crate::models::user::User;
use crate::presence;
use crate::routes::auth::check_len;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UsersQuery {
    pub ids: String,
}

impl UsersQuery {
    fn ids(&self) -> Vec<String> {
        self.ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateKeysRequest {
    pub pub_key: String,
    pub priv_key: String,
    #[serde(default)]
    pub chat_keys: HashMap<String, String>,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub curr_password: String,
    pub new_password: String,
    pub priv_key: String,
}

pub async fn get_users(
    State(state): State<AppState>,
    Query(params): Query<UsersQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ids = params.ids();
    let users: HashMap<String, User> = db::users::get_users(&state.db, &ids)
        .await?
        .into_iter()
        .map(|row| {
            let user = User {
                is_online: presence::is_online(&state, &row.id),
                id: row.id,
                name: row.name,
                nickname: row.nickname,
                last_seen: row.last_seen,
            };
            (user.id.clone(), user)
        })
        .collect();

    Ok(Json(serde_json::json!({ "data": users })))
}

pub async fn get_pub_keys(
    State(state): State<AppState>,
    Query(params): Query<UsersQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let keys = db::users::pub_keys(&state.db, &params.ids()).await?;
    Ok(Json(serde_json::json!({ "data": keys })))
}

pub async fn update_keys(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<UpdateKeysRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated_at = now();
    let mut tx = state.db.begin().await?;
    db::users::update_keys(
        &mut tx,
        &auth.user_id,
        &input.pub_key,
        &input.priv_key,
        &input.chat_keys,
        updated_at,
    )
    .await?;
    tx.commit().await?;
    tracing::info!(user_id = %auth.user_id, chats = input.chat_keys.len(), "keys rotated");

    Ok(Json(serde_json::json!({
        "data": { "latest_key_update": updated_at }
    })))
}

pub async fn update_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<UpdatePasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = db::users::get_user(&state.db, &auth.user_id).await?;
    if !verify_password(&input.curr_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }
    check_len("password", &input.new_password, 6, 255)?;

    let password_hash = hash_password(&input.new_password)?;
    db::users::update_password(&state.db, &auth.user_id, &password_hash, &input.priv_key).await?;
    tracing::info!(user_id = %auth.user_id, "password changed");

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}

pub async fn delete_current_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<DeleteAccountRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = db::users::get_user(&state.db, &auth.user_id).await?;
    if !verify_password(&input.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }

    let mut tx = state.db.begin().await?;
    db::users::delete_user(&mut tx, &auth.user_id).await?;
    tx.commit().await?;

    state.dispatcher.dispatch(
        &state.audience.broadcast(),
        &Event::DeletedUser {
            user_id: auth.user_id.clone(),
        },
    );
    state.tokens.revoke(&auth.user_id);
    state.sessions.close(&auth.user_id);
    tracing::info!(user_id = %auth.user_id, "account deleted");

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}
