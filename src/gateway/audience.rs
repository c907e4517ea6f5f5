use sqlx::{Sqlite, SqlitePool};
use std::collections::HashSet;

use super::session::SessionRegistry;
use crate::db;

/// Users a single event is addressed to. Computed per dispatch, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience(HashSet<String>);

impl Audience {
    pub fn single(user_id: String) -> Self {
        Self(HashSet::from([user_id]))
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    fn without(mut self, actor: Option<&str>) -> Self {
        if let Some(actor) = actor {
            self.0.remove(actor);
        }
        self
    }
}

impl FromIterator<String> for Audience {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Audience {
    type Item = String;
    type IntoIter = std::collections::hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Resolves who should hear about a mutation from current membership.
///
/// Storage errors are logged and produce an empty audience: by the time an
/// audience is needed the mutation has committed and cannot fail anymore.
#[derive(Clone)]
pub struct AudienceResolver {
    db: SqlitePool,
    sessions: SessionRegistry,
}

impl AudienceResolver {
    pub fn new(db: SqlitePool, sessions: SessionRegistry) -> Self {
        Self { db, sessions }
    }

    /// Members of `chat_id` other than `actor`.
    pub async fn chat(&self, chat_id: &str, actor: Option<&str>) -> Audience {
        chat_members(&self.db, chat_id, actor).await
    }

    /// Other members of each one-to-one chat `user_id` belongs to.
    pub async fn presence(&self, user_id: &str) -> Audience {
        match db::chats::direct_companions(&self.db, user_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, "presence audience lookup failed: {e:?}");
                Audience::default()
            }
        }
    }

    /// Everyone currently connected.
    pub fn broadcast(&self) -> Audience {
        self.sessions.online_user_ids().into_iter().collect()
    }
}

/// Chat audience read through an arbitrary executor, so a transaction can
/// snapshot membership before the rows it reads are deleted.
pub async fn chat_members<'e, E>(executor: E, chat_id: &str, actor: Option<&str>) -> Audience
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    match db::chats::member_ids(executor, chat_id).await {
        Ok(ids) => ids.into_iter().collect::<Audience>().without(actor),
        Err(e) => {
            tracing::warn!(chat_id = %chat_id, "chat audience lookup failed: {e:?}");
            Audience::default()
        }
    }
}
