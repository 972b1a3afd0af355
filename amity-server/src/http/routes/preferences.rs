//! Per-user preferences

use std::sync::Arc;

use amity_core::Theme;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::repos::PreferenceRepo;
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct ThemeResponse {
    pub theme: Theme,
}

/// Theme is parsed leniently ("Dark", "auto") rather than by serde
#[derive(Debug, Deserialize)]
pub struct ThemeRequest {
    pub theme: String,
}

/// GET /api/users/preferences/theme
async fn get_theme(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ThemeResponse>, ApiError> {
    let theme = PreferenceRepo::new(&state.pool)
        .get_theme(auth.user_id)
        .await?;
    Ok(Json(ThemeResponse { theme }))
}

/// PUT /api/users/preferences/theme
async fn set_theme(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<ThemeRequest>,
) -> Result<Json<ThemeResponse>, ApiError> {
    let theme: Theme = req.theme.parse()?;
    let theme = PreferenceRepo::new(&state.pool)
        .set_theme(auth.user_id, theme)
        .await?;
    tracing::debug!(user_id = %auth.user_id, %theme, "theme updated");
    Ok(Json(ThemeResponse { theme }))
}

/// Preference routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/users/preferences/theme",
        get(get_theme).put(set_theme),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_serializes_lowercase() {
        let json = serde_json::to_value(ThemeResponse { theme: Theme::Dark }).unwrap();
        assert_eq!(json["theme"], "dark");
    }

    #[test]
    fn unknown_theme_is_bad_request() {
        let err = ApiError::from("sepia".parse::<Theme>().unwrap_err());
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
