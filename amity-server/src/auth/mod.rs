//! Authentication: password hashing, signed tokens, session checks
//!
//! A request is authenticated by a bearer JWT whose `sid` names an active
//! row in `sessions`. Clients also echo the session id in `X-Session-Id`;
//! when present it must match the token.

pub mod password;
pub mod token;

pub use password::{hash_password, verify_dummy, verify_password};
pub use token::{Claims, TokenKeys};

/// Header carrying the session id next to the bearer token
pub const SESSION_HEADER: &str = "x-session-id";

/// Authentication error type
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("session header does not match token")]
    SessionMismatch,

    #[error("session is no longer active")]
    SessionInactive,

    #[error("JWT secret must be at least {min} bytes")]
    WeakSecret { min: usize },

    #[error("JWT secret is not configured")]
    MissingSecret,

    #[error("password hashing failed: {0}")]
    Hash(String),
}
