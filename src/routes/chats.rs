use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashSet;

use crate::db;
use crate::db::chats::NewChat;
use crate::error::AppError;
use crate::gateway::audience::{chat_members as audience_chat_members, Audience};
use crate::gateway::events::Event;
use crate::middleware::auth::AuthUser;
use crate::middleware::permissions::{require_admin, require_membership};
use crate::models::chat::{ChatMemberInput, ChatType, CreateChat, UpdateChat};
use crate::models::now;
use crate::routes::auth::check_len;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddMembersRequest {
    pub members: Vec<ChatMemberInput>,
}

#[derive(Deserialize)]
pub struct RemoveMembersRequest {
    pub member_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct WritingRequest {
    pub is_writing: bool,
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    pub before: Option<NaiveDateTime>,
    pub limit: Option<i64>,
}

fn validate_details(name: Option<&str>, description: Option<&str>) -> Result<(), AppError> {
    if let Some(name) = name {
        check_len("name", name, 2, 50)?;
    }
    if let Some(description) = description {
        if description.chars().count() > 255 {
            return Err(AppError::BadRequest(
                "description must be at most 255 characters".to_string(),
            ));
        }
    }
    Ok(())
}

async fn require_users_exist(state: &AppState, members: &[ChatMemberInput]) -> Result<(), AppError> {
    for member in members {
        if !db::users::user_exists(&state.db, &member.id).await? {
            return Err(AppError::NotFound(format!("unknown user {}", member.id)));
        }
    }
    Ok(())
}

/// Send each recipient their own view of the chat.
async fn send_snapshots<I>(state: &AppState, chat_id: &str, recipients: I)
where
    I: IntoIterator<Item = String>,
{
    let mut events = Vec::new();
    for user_id in recipients {
        match db::chats::chat_snapshot(&state.db, chat_id, &user_id).await {
            Ok(chat) => events.push((user_id, Event::NewChat { chat })),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, user_id = %user_id, "snapshot failed: {e:?}")
            }
        }
    }
    state.dispatcher.dispatch_each(events);
}

pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let chats = db::chats::list_chats(&state.db, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "data": chats })))
}

pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateChat>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.members.iter().any(|m| m.id == auth.user_id) {
        return Err(AppError::BadRequest("cannot add yourself as a member".to_string()));
    }
    let unique: HashSet<&str> = input.members.iter().map(|m| m.id.as_str()).collect();
    if unique.len() != input.members.len() {
        return Err(AppError::BadRequest("duplicate members".to_string()));
    }

    let mut members = input.members.clone();
    let (name, description, is_private) = match input.chat_type {
        ChatType::Chat => {
            if members.len() != 1 {
                return Err(AppError::BadRequest(
                    "a direct chat needs exactly one member".to_string(),
                ));
            }
            require_users_exist(&state, &members).await?;
            if db::chats::direct_chat_exists(&state.db, &auth.user_id, &members[0].id).await? {
                return Err(AppError::Conflict("direct chat already exists".to_string()));
            }
            for member in &mut members {
                member.is_admin = true;
            }
            (None, None, true)
        }
        ChatType::Group | ChatType::Channel => {
            let name = input
                .name
                .as_deref()
                .map(str::trim)
                .ok_or_else(|| AppError::BadRequest("name is required".to_string()))?;
            validate_details(Some(name), input.description.as_deref())?;
            require_users_exist(&state, &members).await?;
            (
                Some(name),
                input.description.as_deref(),
                input.is_private.unwrap_or(false),
            )
        }
    };

    let creator = ChatMemberInput {
        id: auth.user_id.clone(),
        key: input.my_key.clone(),
        is_admin: true,
    };

    let mut tx = state.db.begin().await?;
    let chat_id = db::chats::create_chat(
        &mut tx,
        &NewChat {
            chat_type: input.chat_type,
            name,
            description,
            is_private,
            created_at: now(),
        },
        &creator,
        &members,
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(chat_id = %chat_id, chat_type = input.chat_type.as_str(), "chat created");
    let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    send_snapshots(&state, &chat_id, audience).await;

    Ok(Json(serde_json::json!({
        "data": { "chat_id": chat_id }
    })))
}

pub async fn update_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<UpdateChat>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    require_admin(&state.db, &chat_id, &auth.user_id).await?;
    if chat.chat_type == ChatType::Chat {
        return Err(AppError::Forbidden("direct chats cannot be edited".to_string()));
    }
    let name = input.name.as_deref().map(str::trim);
    validate_details(name, input.description.as_deref())?;

    let mut tx = state.db.begin().await?;
    db::chats::update_chat(&mut tx, &chat_id, name, input.description.as_deref()).await?;
    tx.commit().await?;

    let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    send_snapshots(&state, &chat_id, audience).await;

    let updated = db::chats::chat_snapshot(&state.db, &chat_id, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "data": updated })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    db::chats::get_chat(&state.db, &chat_id).await?;
    require_admin(&state.db, &chat_id, &auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    let audience = audience_chat_members(&mut *tx, &chat_id, Some(&auth.user_id)).await;
    db::chats::delete_chat(&mut tx, &chat_id).await?;
    tx.commit().await?;

    state
        .dispatcher
        .dispatch(&audience, &Event::DeletedChat { chat_id: chat_id.clone() });

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}

pub async fn add_members(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<AddMembersRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.members.is_empty() {
        return Err(AppError::BadRequest("no members given".to_string()));
    }
    if input.members.iter().any(|m| m.id == auth.user_id) {
        return Err(AppError::BadRequest("cannot add yourself as a member".to_string()));
    }
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    if chat.chat_type == ChatType::Chat {
        return Err(AppError::Forbidden("direct chats have fixed members".to_string()));
    }
    require_admin(&state.db, &chat_id, &auth.user_id).await?;
    require_users_exist(&state, &input.members).await?;

    let mut tx = state.db.begin().await?;
    db::chats::add_members(&mut tx, &chat_id, &input.members).await?;
    tx.commit().await?;

    // Added members get the chat; existing ones get the new member count.
    let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    send_snapshots(&state, &chat_id, audience).await;

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}

pub async fn remove_members(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<RemoveMembersRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.member_ids.is_empty() {
        return Err(AppError::BadRequest("no members given".to_string()));
    }
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    if chat.chat_type == ChatType::Chat {
        return Err(AppError::Forbidden("direct chats have fixed members".to_string()));
    }
    require_admin(&state.db, &chat_id, &auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    db::chats::remove_members(&mut tx, &chat_id, &input.member_ids).await?;
    tx.commit().await?;

    let removed: Audience = input.member_ids.into_iter().collect();
    state
        .dispatcher
        .dispatch(&removed, &Event::DeletedChat { chat_id: chat_id.clone() });
    let remaining = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    send_snapshots(&state, &chat_id, remaining).await;

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}

pub async fn join_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    if chat.chat_type == ChatType::Chat || chat.is_private {
        return Err(AppError::Forbidden("chat is not open to join".to_string()));
    }

    let mut tx = state.db.begin().await?;
    db::chats::add_members(
        &mut tx,
        &chat_id,
        &[ChatMemberInput {
            id: auth.user_id.clone(),
            key: None,
            is_admin: false,
        }],
    )
    .await?;
    tx.commit().await?;

    let snapshot = db::chats::chat_snapshot(&state.db, &chat_id, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "data": snapshot })))
}

pub async fn leave_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    if chat.chat_type == ChatType::Chat {
        return Err(AppError::Forbidden("direct chats cannot be left".to_string()));
    }
    require_membership(&state.db, &chat_id, &auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    let deleted = db::chats::leave_chat(&mut tx, &chat_id, &auth.user_id).await?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "data": { "chat_deleted": deleted }
    })))
}

pub async fn read_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    db::chats::get_chat(&state.db, &chat_id).await?;
    require_membership(&state.db, &chat_id, &auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    let advanced = db::chats::mark_read(&mut tx, &chat_id, &auth.user_id, now()).await?;
    tx.commit().await?;

    if let Some(last_reading) = advanced {
        let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
        state.dispatcher.dispatch(
            &audience,
            &Event::ReadedMessages {
                chat_id: chat_id.clone(),
                last_reading,
            },
        );
    }

    Ok(Json(serde_json::json!({
        "data": { "last_reading": advanced }
    })))
}

/// Ids of the other members of a chat the caller belongs to.
pub async fn chat_members(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    db::chats::get_chat(&state.db, &chat_id).await?;
    require_membership(&state.db, &chat_id, &auth.user_id).await?;

    let others: Vec<String> = db::chats::member_ids(&state.db, &chat_id)
        .await?
        .into_iter()
        .filter(|id| *id != auth.user_id)
        .collect();
    Ok(Json(serde_json::json!({ "data": others })))
}

/// Typing indicator. Nothing is stored.
pub async fn set_writing(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<WritingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_membership(&state.db, &chat_id, &auth.user_id).await?;

    let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    state.dispatcher.dispatch(
        &audience,
        &Event::NewWriting {
            user_id: auth.user_id.clone(),
            chat_id: chat_id.clone(),
            is_writing: input.is_writing,
        },
    );

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Query(params): Query<ListMessagesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_membership(&state.db, &chat_id, &auth.user_id).await?;
    let before = params.before.unwrap_or_else(now);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let messages =
        db::messages::list_messages(&state.db, &chat_id, &auth.user_id, before, limit).await?;
    Ok(Json(serde_json::json!({ "data": messages })))
}
