//! HTTP layer
//!
//! Axum server with:
//! - CORS (localhost only by default)
//! - Bearer token + session header auth
//! - Request tracing
//! - Graceful shutdown
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{router, run_server, AppState, ServerConfig, ServerError};
