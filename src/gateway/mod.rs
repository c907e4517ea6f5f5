pub mod audience;
pub mod dispatcher;
pub mod events;
pub mod lifecycle;
pub mod session;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db;
use crate::presence;
use crate::state::AppState;
use events::{AuthPayload, HandshakeError};
use lifecycle::{ConnectionState, Lifecycle};
use session::{ConnectionHandle, Outbound};

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut lifecycle = Lifecycle::new();
    step(&mut lifecycle, ConnectionState::Authenticating);

    let auth = match authenticate(&mut ws_stream, &state).await {
        Ok(auth) => auth,
        Err(e) => {
            tracing::debug!("handshake rejected: {e}");
            reject(&mut ws_sink, &e).await;
            step(&mut lifecycle, ConnectionState::Closed);
            return;
        }
    };
    let user_id = auth.user_id;

    step(&mut lifecycle, ConnectionState::Active);
    let (handle, mut rx) = ConnectionHandle::new();
    let connection_id = handle.id();
    if activate(&state, &user_id, &auth.token, handle) {
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "connected");
        presence::announce(&state, &user_id, true).await;
        pump(&mut ws_sink, &mut ws_stream, &mut rx, &user_id, connection_id, &state).await;
    } else {
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "token revoked during handshake");
    }

    step(&mut lifecycle, ConnectionState::Closing);
    let _ = tokio::time::timeout(state.gateway.send_timeout, ws_sink.close()).await;
    teardown(&state, &user_id, connection_id).await;
    step(&mut lifecycle, ConnectionState::Closed);
}

/// Wait for the auth frame and validate it against the token store.
async fn authenticate(
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Result<AuthPayload, HandshakeError> {
    let deadline = tokio::time::sleep(state.gateway.auth_timeout);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            _ = &mut deadline => return Err(HandshakeError::TimedOut),
            msg = stream.next() => msg,
        };

        let payload = match msg {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<AuthPayload>(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<AuthPayload>(&bytes),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                return Err(HandshakeError::Disconnected)
            }
        }
        .map_err(|_| HandshakeError::InvalidPayload)?;

        if !state.tokens.check(&payload.user_id, &payload.token) {
            return Err(HandshakeError::Unauthorized);
        }
        return Ok(payload);
    }
}

/// Register the session, then confirm its token is still valid. A logout that
/// revoked it after the handshake check found no session to close.
fn activate(state: &AppState, user_id: &str, token: &str, handle: ConnectionHandle) -> bool {
    state.sessions.register(user_id, token, handle);
    state.tokens.check(user_id, token)
}

/// Keep-alive loop: write queued frames, discard inbound ones, stop on close.
async fn pump(
    sink: &mut SplitSink<WebSocket, Message>,
    stream: &mut SplitStream<WebSocket>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    user_id: &str,
    connection_id: Uuid,
    state: &AppState,
) {
    let send_timeout = state.gateway.send_timeout;
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(frame)) => {
                    match tokio::time::timeout(send_timeout, sink.send(Message::Text(frame))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(user_id = %user_id, "write failed: {e}");
                            break;
                        }
                        Err(_) => {
                            tracing::warn!(user_id = %user_id, connection_id = %connection_id, "write timed out");
                            break;
                        }
                    }
                }
                Some(Outbound::Close) | None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(user_id = %user_id, "read failed: {e}");
                    break;
                }
                // Clients only keep the socket alive; anything they send is ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn reject(sink: &mut SplitSink<WebSocket, Message>, error: &HandshakeError) {
    if let Some(frame) = error.frame() {
        if let Ok(text) = serde_json::to_string(&frame) {
            let _ = sink.send(Message::Text(text.into())).await;
        }
    }
    let _ = sink.close().await;
}

/// Best-effort cleanup once the connection loop has ended. Skipped entirely
/// when a newer connection for the same user has taken over.
async fn teardown(state: &AppState, user_id: &str, connection_id: Uuid) {
    let Some(session) = state.sessions.unregister_connection(user_id, connection_id) else {
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "superseded, skipping teardown");
        return;
    };

    if let Err(e) = db::users::touch_last_seen(&state.db, user_id, crate::models::now()).await {
        tracing::warn!(user_id = %user_id, "failed to persist last_seen: {e:?}");
    }
    state.tokens.revoke_if(user_id, &session.token);
    presence::announce(state, user_id, false).await;
    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        online_secs = (Utc::now() - session.connected_at).num_seconds(),
        "disconnected"
    );
}

fn step(lifecycle: &mut Lifecycle, to: ConnectionState) {
    if let Err(e) = lifecycle.advance(to) {
        tracing::error!("{e}");
    }
}
