use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A user as other users see them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub nickname: String,
    pub last_seen: NaiveDateTime,
    pub is_online: bool,
}

/// Row from the DB, including credentials. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub nickname: String,
    pub pub_key: String,
    pub priv_key: String,
    pub last_seen: NaiveDateTime,
    pub latest_key_update: NaiveDateTime,
}

#[derive(Debug)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub nickname: String,
    pub pub_key: String,
    pub priv_key: String,
}
