//! ZIP code lookup passthrough

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::geo::ZipInfo;
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::http::server::AppState;
use crate::models::ZipCode;

/// GET /api/geo/zip/{zip}
async fn lookup_zip(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(zip): Path<String>,
) -> Result<Json<ZipInfo>, ApiError> {
    let zip = ZipCode::new(&zip)?;
    let info = state.geo.lookup(&zip).await?;
    Ok(Json(info))
}

/// Geo routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/geo/zip/{zip}", get(lookup_zip))
}
