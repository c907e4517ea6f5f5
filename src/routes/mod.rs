mod auth;
mod chats;
mod health;
mod messages;
mod users;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(crate::gateway::ws_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/version", get(health::version))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users", get(users::get_users))
        .route("/users/pub_keys", get(users::get_pub_keys))
        .route("/users/@me", delete(users::delete_current_user))
        .route("/users/@me/keys", put(users::update_keys))
        .route("/users/@me/password", put(users::update_password))
        // Chats
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route(
            "/chats/{chat_id}",
            patch(chats::update_chat).delete(chats::delete_chat),
        )
        .route(
            "/chats/{chat_id}/members",
            get(chats::chat_members)
                .post(chats::add_members)
                .delete(chats::remove_members),
        )
        .route("/chats/{chat_id}/join", post(chats::join_chat))
        .route("/chats/{chat_id}/leave", post(chats::leave_chat))
        .route("/chats/{chat_id}/read", post(chats::read_chat))
        .route("/chats/{chat_id}/writing", post(chats::set_writing))
        .route("/chats/{chat_id}/messages", get(chats::list_messages))
        .route(
            "/chats/{chat_id}/messages/bulk-delete",
            post(messages::bulk_delete_messages),
        )
        // Messages
        .route("/messages", post(messages::send_messages))
        .route("/messages/{message_id}/like", post(messages::like_message))
}
