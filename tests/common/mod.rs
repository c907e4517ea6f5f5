#![allow(dead_code)]

use axum::body::Body;
use futures_util::{SinkExt, StreamExt};
use http::{Method, Request};
use onfine::config::GatewayConfig;
use onfine::db;
use onfine::models::chat::{ChatMemberInput, ChatType};
use onfine::models::user::CreateUser;
use onfine::routes;
use onfine::state::AppState;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const PASSWORD: &str = "correct-horse";

/// A user created for testing, bundling the id with its live token.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

/// Test server that owns its own SQLite database file and full AppState.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
    base_url: Option<String>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_gateway(GatewayConfig::default()).await
    }

    pub async fn with_gateway(gateway: GatewayConfig) -> Self {
        let path = std::env::temp_dir().join(format!("onfine-test-{}.db", uuid::Uuid::new_v4()));
        let pool = db::create_pool(&format!("sqlite:{}", path.display()))
            .await
            .expect("failed to create test pool");

        Self {
            state: AppState::new(pool, gateway),
            base_url: None,
        }
    }

    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the ws base URL.
    pub async fn spawn(&mut self) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = format!("ws://127.0.0.1:{}", addr.port());
        self.base_url = Some(url.clone());
        url
    }

    /// Insert a user straight into the DB and issue a token for them.
    /// The stored hash is a real Argon2 hash of [`PASSWORD`].
    pub async fn create_user_with_token(&self, nickname: &str) -> TestUser {
        let user = db::users::create_user(
            self.pool(),
            &CreateUser {
                email: format!("{nickname}@example.com"),
                password_hash: onfine::middleware::auth::hash_password(PASSWORD).unwrap(),
                name: nickname.to_string(),
                nickname: nickname.to_string(),
                pub_key: format!("pub-{nickname}"),
                priv_key: format!("priv-{nickname}"),
            },
        )
        .await
        .expect("failed to create test user");

        let token = self.state.tokens.issue(&user.id);
        TestUser {
            id: user.id,
            email: user.email,
            token,
        }
    }

    /// Create a chat directly in the DB. The creator is admin.
    pub async fn create_chat(&self, chat_type: ChatType, creator: &TestUser, members: &[&TestUser]) -> String {
        let members: Vec<ChatMemberInput> = members
            .iter()
            .map(|m| ChatMemberInput {
                id: m.id.clone(),
                key: Some(format!("key-{}", m.id)),
                is_admin: chat_type == ChatType::Chat,
            })
            .collect();
        let mut tx = self.pool().begin().await.unwrap();
        let chat_id = db::chats::create_chat(
            &mut tx,
            &db::chats::NewChat {
                chat_type,
                name: Some("test chat"),
                description: None,
                is_private: false,
                created_at: onfine::models::now(),
            },
            &ChatMemberInput {
                id: creator.id.clone(),
                key: Some(format!("key-{}", creator.id)),
                is_admin: true,
            },
            &members,
        )
        .await
        .expect("failed to create test chat");
        tx.commit().await.unwrap();
        chat_id
    }

    /// Open a gateway connection, authenticate and wait until it is registered.
    pub async fn connect(&mut self, user: &TestUser) -> WsClient {
        let url = self.spawn().await;
        let (mut ws, _) = connect_async(format!("{url}/ws")).await.unwrap();
        let auth = serde_json::json!({ "user_id": user.id, "token": user.token });
        ws.send(Message::Text(auth.to_string().into())).await.unwrap();
        self.wait_until(|s| s.sessions.is_online(&user.id)).await;
        ws
    }

    pub async fn wait_until<F>(&self, check: F)
    where
        F: Fn(&AppState) -> bool,
    {
        for _ in 0..200 {
            if check(&self.state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<serde_json::Value>,
    ) -> (http::StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder
                .header("X-User-Id", &user.id)
                .header("Authorization", format!("Bearer {}", user.token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }
}

/// Next text frame as JSON, skipping control frames. Panics after a few seconds.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(Message::Close(_))) | None => panic!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("ws error: {e}"),
            }
        }
    });
    deadline.await.expect("no frame received in time")
}

/// Asserts that no text frame arrives within `ms` milliseconds.
pub async fn assert_silent(ws: &mut WsClient, ms: u64) {
    let received = tokio::time::timeout(Duration::from_millis(ms), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                    std::future::pending::<()>().await
                }
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = received {
        panic!("expected silence, got {text}");
    }
}

/// Waits for the server to close the connection.
pub async fn expect_closed(ws: &mut WsClient) {
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(Message::Text(text))) => panic!("unexpected frame {text}"),
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connection was not closed");
}

/// Router over a fresh, empty server for one-shot requests.
pub async fn test_app() -> axum::Router {
    TestServer::new().await.router()
}
