use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::{hash_password, verify_password, AuthUser};
use crate::models::user::CreateUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub nickname: String,
    #[serde(default)]
    pub pub_key: String,
    #[serde(default)]
    pub priv_key: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub(crate) fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::BadRequest(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let email = input.email.trim();
    if !email.contains('@') || email.chars().count() > 50 {
        return Err(AppError::BadRequest("invalid email".to_string()));
    }
    check_len("password", &input.password, 6, 255)?;
    check_len("name", input.name.trim(), 2, 50)?;
    check_len("nickname", input.nickname.trim(), 2, 50)?;

    if db::users::is_taken(&state.db, email, input.nickname.trim()).await? {
        return Err(AppError::Conflict("email or nickname already taken".to_string()));
    }

    let user = db::users::create_user(
        &state.db,
        &CreateUser {
            email: email.to_string(),
            password_hash: hash_password(&input.password)?,
            name: input.name.trim().to_string(),
            nickname: input.nickname.trim().to_string(),
            pub_key: input.pub_key,
            priv_key: input.priv_key,
        },
    )
    .await?;

    let token = state.tokens.issue(&user.id);
    tracing::info!(user_id = %user.id, "user registered");

    Ok(Json(serde_json::json!({
        "data": {
            "user_id": user.id,
            "token": token
        }
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = db::users::get_user_by_email(&state.db, input.email.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;

    if !verify_password(&input.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    }

    // The new token replaces the one a live connection authenticated with.
    let token = state.tokens.issue(&user.id);
    if state.sessions.close(&user.id) {
        tracing::info!(user_id = %user.id, "login superseded live connection");
    }

    Ok(Json(serde_json::json!({
        "data": {
            "user_id": user.id,
            "token": token,
            "priv_key": user.priv_key,
            "name": user.name,
            "nickname": user.nickname,
            "latest_key_update": user.latest_key_update
        }
    })))
}

/// Revoke the token and drop the live connection, whose teardown announces
/// the user offline.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state.tokens.revoke(&auth.user_id);
    state.sessions.close(&auth.user_id);

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}
