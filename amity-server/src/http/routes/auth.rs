//! Registration, login and logout

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::users::MeResponse;
use crate::auth::{hash_password, verify_dummy, verify_password, AuthError};
use crate::db::repos::{NewUser, SessionRepo, User, UserRepo};
use crate::events::EventPayload;
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::http::server::AppState;
use crate::models::{DisplayName, Email, Password, Username};

/// Register request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to the username
    pub display_name: Option<String>,
}

/// Login request; `login` is a username or an email
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

/// Issued credentials. Send `token` as `Authorization: Bearer` and
/// `session_id` as `X-Session-Id`.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user: MeResponse,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/auth/register
async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let username = Username::new(&req.username)?;
    let email = Email::new(&req.email)?;
    let password = Password::new(&req.password)?;
    let display_name = DisplayName::new(req.display_name.as_deref().unwrap_or(username.as_str()))?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)??;

    let user = UserRepo::new(&state.pool)
        .create(NewUser {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            display_name: &display_name,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    let response = open_session(&state, user, &headers).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Some(user) = UserRepo::new(&state.pool).find_by_login(&req.login).await? else {
        let password = req.password;
        tokio::task::spawn_blocking(move || verify_dummy(&password))
            .await
            .map_err(ApiError::internal)?;
        return Err(AuthError::InvalidCredentials.into());
    };

    let stored = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(ApiError::internal)??;
    if !valid {
        tracing::debug!(user_id = %user.id, "login rejected");
        return Err(AuthError::InvalidCredentials.into());
    }

    UserRepo::new(&state.pool).touch_last_seen(user.id).await?;
    Ok(Json(open_session(&state, user, &headers).await?))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<StatusCode, ApiError> {
    SessionRepo::new(&state.pool)
        .revoke(auth.session_id, auth.user_id)
        .await?;
    state.events.publish(
        auth.user_id,
        EventPayload::SessionRevoked {
            session_id: auth.session_id,
        },
    );
    tracing::debug!(user_id = %auth.user_id, session_id = %auth.session_id, "logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/refresh - new token for the current session
async fn refresh(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.tokens.issue(auth.user_id, auth.session_id)?;
    Ok(Json(TokenResponse {
        token,
        session_id: auth.session_id,
        expires_at: Utc::now() + chrono::Duration::seconds(state.tokens.ttl_secs()),
    }))
}

async fn open_session(
    state: &AppState,
    user: User,
    headers: &HeaderMap,
) -> Result<AuthResponse, ApiError> {
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    let session = SessionRepo::new(&state.pool)
        .create(user.id, state.session_ttl, user_agent)
        .await?;
    let token = state.tokens.issue(user.id, session.id)?;

    Ok(AuthResponse {
        token,
        session_id: session.id,
        expires_at: session.expires_at,
        user: MeResponse::from(user),
    })
}

/// Auth routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh", post(refresh))
}
