use sqlx::SqlitePool;

use crate::config::GatewayConfig;
use crate::gateway::audience::AudienceResolver;
use crate::gateway::dispatcher::NotificationDispatcher;
use crate::gateway::session::SessionRegistry;
use crate::tokens::AuthTokenStore;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sessions: SessionRegistry,
    pub tokens: AuthTokenStore,
    pub audience: AudienceResolver,
    pub dispatcher: NotificationDispatcher,
    pub gateway: GatewayConfig,
}

impl AppState {
    /// Wire up fresh, empty session and token registries around `db`.
    pub fn new(db: SqlitePool, gateway: GatewayConfig) -> Self {
        let sessions = SessionRegistry::new();
        Self {
            audience: AudienceResolver::new(db.clone(), sessions.clone()),
            dispatcher: NotificationDispatcher::new(sessions.clone()),
            tokens: AuthTokenStore::new(),
            sessions,
            db,
            gateway,
        }
    }
}
