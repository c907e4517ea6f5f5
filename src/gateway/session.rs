use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Work queued for a connection's writer task. Frames share one buffer
/// across every recipient of the same event.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Utf8Bytes),
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is gone")]
    ConnectionGone,
}

/// Sending half of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, frame: Utf8Bytes) -> Result<(), DeliveryError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| DeliveryError::ConnectionGone)
    }

    /// Ask the connection to shut down. A connection already gone is ignored.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// An authenticated connection and the token it authenticated with.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub handle: ConnectionHandle,
    pub connected_at: DateTime<Utc>,
}

/// Outcome of pushing one frame to a set of users.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub offline: usize,
    pub failed: usize,
}

/// Live connections keyed by user, at most one per user.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` as the live connection of `user_id`. The connection it
    /// replaces, if any, is told to close and returned.
    pub fn register(
        &self,
        user_id: &str,
        token: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let session = Session {
            user_id: user_id.to_string(),
            token: token.to_string(),
            handle,
            connected_at: Utc::now(),
        };
        let previous = self
            .sessions
            .insert(user_id.to_string(), session)
            .map(|old| old.handle);

        if let Some(ref old) = previous {
            tracing::info!(user_id = %user_id, connection_id = %old.id(), "superseding connection");
            old.close();
        }
        previous
    }

    pub fn unregister(&self, user_id: &str) {
        self.sessions.remove(user_id);
    }

    /// Remove the entry only while it still belongs to `connection_id`.
    pub fn unregister_connection(&self, user_id: &str, connection_id: Uuid) -> Option<Session> {
        self.sessions
            .remove_if(user_id, |_, s| s.handle.id() == connection_id)
            .map(|(_, session)| session)
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.sessions.get(user_id).map(|s| s.handle.clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.lookup(user_id).is_some()
    }

    /// Push `frame` to every listed user that is connected. Unregistered users
    /// are skipped and a failure for one user never stops the rest.
    pub fn send_to<'a, I>(&self, user_ids: I, frame: &Utf8Bytes) -> DeliveryReport
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut report = DeliveryReport::default();
        for user_id in user_ids {
            let Some(handle) = self.lookup(user_id) else {
                report.offline += 1;
                continue;
            };
            match handle.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, connection_id = %handle.id(), "delivery failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Ask the user's live connection to close. Its own teardown removes it.
    pub fn close(&self, user_id: &str) -> bool {
        match self.lookup(user_id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn online_user_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().handle.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
