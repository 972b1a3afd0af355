//! amity-server: HTTP API for profiles, connections, notifications and chat
//!
//! Layout:
//! - `models`: validated input types
//! - `db`: pool, migrations and repositories
//! - `auth`: password hashing and session tokens
//! - `events`: live update fan-out for the SSE stream
//! - `http`: axum router, extractors and handlers

pub mod auth;
pub mod db;
pub mod events;
pub mod geo;
pub mod http;
pub mod models;
pub mod uploads;

pub use db::{create_pool, create_pool_with_options, DbError};
pub use http::{router, run_server, ApiError, AppState, ServerConfig, ServerError};
