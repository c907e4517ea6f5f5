use chrono::{DateTime, Utc};
use dashmap::DashMap;
use data_encoding::HEXLOWER;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

const TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone)]
struct AuthToken {
    value: String,
    issued_at: DateTime<Utc>,
}

/// Ephemeral bearer tokens, at most one per user.
///
/// Tokens live only in memory: a restart logs everyone out. Issuing a token
/// for a user silently replaces the previous one.
#[derive(Clone, Default)]
pub struct AuthTokenStore {
    tokens: Arc<DashMap<String, AuthToken>>,
}

impl AuthTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `user_id`, invalidating any earlier one.
    pub fn issue(&self, user_id: &str) -> String {
        let value = generate_token();
        self.tokens.insert(
            user_id.to_string(),
            AuthToken {
                value: value.clone(),
                issued_at: Utc::now(),
            },
        );
        tracing::debug!(user_id = %user_id, "auth token issued");
        value
    }

    pub fn check(&self, user_id: &str, token: &str) -> bool {
        match self.tokens.get(user_id) {
            Some(stored) => constant_time_eq(stored.value.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    /// Remove the token for `user_id`. Absence is not an error.
    pub fn revoke(&self, user_id: &str) {
        if self.tokens.remove(user_id).is_some() {
            tracing::debug!(user_id = %user_id, "auth token revoked");
        }
    }

    /// Remove the token for `user_id` only while it still equals `token`.
    /// Returns whether it was removed.
    pub fn revoke_if(&self, user_id: &str, token: &str) -> bool {
        let removed = self
            .tokens
            .remove_if(user_id, |_, stored| {
                constant_time_eq(stored.value.as_bytes(), token.as_bytes())
            })
            .is_some();
        if removed {
            tracing::debug!(user_id = %user_id, "auth token revoked");
        }
        removed
    }

    pub fn issued_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.tokens.get(user_id).map(|t| t.issued_at)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
