//! Health check endpoint

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::http::server::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

impl HealthResponse {
    fn new(database_ok: bool) -> (StatusCode, Self) {
        let (code, status, database) = if database_ok {
            (StatusCode::OK, "ok", "ok")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        };
        (
            code,
            Self {
                status,
                version: env!("CARGO_PKG_VERSION"),
                database,
            },
        )
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("health check: database unreachable: {}", e);
            false
        }
    };
    let (code, body) = HealthResponse::new(database_ok);
    (code, Json(body))
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
