pub mod chat;
pub mod message;
pub mod user;

/// Current wall-clock time as naive UTC, the form every timestamp is stored in.
pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
