use axum::extract::{Path, State};
use axum::Json;
use std::collections::{HashMap, HashSet};

use crate::db;
use crate::error::AppError;
use crate::gateway::events::Event;
use crate::middleware::auth::AuthUser;
use crate::middleware::permissions::{can_delete, can_post, require_membership};
use crate::models::message::{DeleteMessages, Message, SendMessages};
use crate::models::now;
use crate::state::AppState;

/// Post one message into each of several chats, all stamped with the same time.
pub async fn send_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<SendMessages>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.messages.is_empty() {
        return Err(AppError::BadRequest("no messages given".to_string()));
    }
    let chat_ids: HashSet<&str> = input.messages.iter().map(|m| m.chat_id.as_str()).collect();
    if chat_ids.len() != input.messages.len() {
        return Err(AppError::BadRequest("one message per chat".to_string()));
    }

    for msg in &input.messages {
        let chat = db::chats::get_chat(&state.db, &msg.chat_id).await?;
        let member = require_membership(&state.db, &msg.chat_id, &auth.user_id).await?;
        if !can_post(chat.chat_type, &member) {
            return Err(AppError::Forbidden("only admins can post in a channel".to_string()));
        }
    }
    if let Some(ref reply_sender_id) = input.reply_sender_id {
        if !db::users::user_exists(&state.db, reply_sender_id).await? {
            return Err(AppError::NotFound("unknown reply sender".to_string()));
        }
    }

    let date_time = now();
    let mut sent: Vec<(String, Message)> = Vec::with_capacity(input.messages.len());

    let mut tx = state.db.begin().await?;
    for msg in &input.messages {
        let message = db::messages::insert_message(
            &mut tx,
            &auth.user_id,
            msg,
            input.reply_sender_id.as_deref(),
            date_time,
        )
        .await?;
        sent.push((msg.chat_id.clone(), message));
    }
    tx.commit().await?;

    let mut message_ids = HashMap::new();
    for (chat_id, message) in sent {
        message_ids.insert(chat_id.clone(), message.id.clone());
        let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
        state
            .dispatcher
            .dispatch(&audience, &Event::NewMessage { chat_id, message });
    }

    Ok(Json(serde_json::json!({
        "data": {
            "message_ids": message_ids,
            "date_time": date_time
        }
    })))
}

pub async fn like_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let message = db::messages::get_message_ref(&state.db, &message_id).await?;
    require_membership(&state.db, &message.chat_id, &auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    let is_liked = db::messages::toggle_like(&mut tx, &message_id, &auth.user_id).await?;
    tx.commit().await?;

    let audience = state.audience.chat(&message.chat_id, Some(&auth.user_id)).await;
    state.dispatcher.dispatch(
        &audience,
        &Event::NewLike {
            chat_id: message.chat_id.clone(),
            message_id: message_id.clone(),
            is_liked,
        },
    );

    Ok(Json(serde_json::json!({
        "data": { "is_liked": is_liked }
    })))
}

pub async fn bulk_delete_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    auth: AuthUser,
    Json(input): Json<DeleteMessages>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.message_ids.is_empty() {
        return Err(AppError::BadRequest("no messages given".to_string()));
    }
    let chat = db::chats::get_chat(&state.db, &chat_id).await?;
    let member = require_membership(&state.db, &chat_id, &auth.user_id).await?;

    let unique: HashSet<&String> = input.message_ids.iter().collect();
    let refs = db::messages::refs_in_chat(&state.db, &chat_id, &input.message_ids).await?;
    if refs.len() != unique.len() {
        return Err(AppError::NotFound("unknown message".to_string()));
    }
    if refs
        .iter()
        .any(|r| !can_delete(chat.chat_type, &member, r.sender_id.as_deref()))
    {
        return Err(AppError::Forbidden("cannot delete these messages".to_string()));
    }

    let message_ids: Vec<String> = refs.into_iter().map(|r| r.id).collect();
    let mut tx = state.db.begin().await?;
    db::messages::delete_messages(&mut tx, &chat_id, &message_ids).await?;
    tx.commit().await?;

    let audience = state.audience.chat(&chat_id, Some(&auth.user_id)).await;
    state.dispatcher.dispatch(
        &audience,
        &Event::DeletedMessages {
            chat_id: chat_id.clone(),
            message_ids,
        },
    );

    Ok(Json(serde_json::json!({
        "data": { "ok": true }
    })))
}
