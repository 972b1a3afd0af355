//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Uses JOINs for list operations (no N+1)
//! - Handles conflicts via constraints / ON CONFLICT (no check-then-insert)
//! - Uses transactions for multi-step operations

pub mod users;
pub mod sessions;
pub mod connections;
pub mod notifications;
pub mod chats;
pub mod preferences;

pub use users::{NewUser, ProfileUpdate, User, UserRepo};
pub use sessions::{Session, SessionRepo};
pub use connections::{
    ConnectedUser, Connection, ConnectionRepo, ConnectionWithUser, PairRepair, PendingConnections,
    RequestResult,
};
pub use notifications::{NewNotification, Notification, NotificationRepo, StatusRepair};
pub use chats::{Chat, ChatMessage, ChatRepo, ChatSummary, LastMessage};
pub use preferences::PreferenceRepo;

/// Postgres error code for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// A constraint or state rule rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is well-formed but not allowed by the domain rules
    #[error("invalid: {0}")]
    Invalid(String),

    /// A stored value could not be interpreted
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

/// Whether an sqlx error is a unique constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}
