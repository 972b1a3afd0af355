//! Notification endpoints
//!
//! Responses always carry the reconciled read state, so a row whose
//! stored flags disagree is still reported consistently.

use std::sync::Arc;

use amity_core::NotificationStatus;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repos::{NewNotification, Notification, NotificationRepo, StatusRepair};
use crate::events::EventPayload;
use crate::http::error::ApiError;
use crate::http::extractors::{AuthUser, ValidUuid};
use crate::http::server::AppState;
use crate::models::{Paginated, Pagination, PaginationParams};

/// Notification response
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub actor_id: Option<Uuid>,
    pub status: NotificationStatus,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        let (status, read) = n.read_state().repaired();
        Self {
            id: n.id,
            kind: n.kind,
            message: n.message,
            link: n.link,
            actor_id: n.actor_id,
            status,
            read,
            created_at: n.created_at,
            read_at: n.read_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DryRunParams {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

/// Store a notification and push it to the recipient's live stream.
///
/// Called after the triggering write has committed, so a failure here is
/// logged instead of failing the request.
pub(crate) async fn deliver(state: &AppState, new: NewNotification<'_>) {
    let recipient = new.user_id;
    let kind = new.kind;

    match NotificationRepo::new(&state.pool).create(new).await {
        Ok(notification) => state.events.publish(
            recipient,
            EventPayload::NotificationCreated {
                notification_id: notification.id,
                kind,
                message: notification.message,
            },
        ),
        Err(e) => tracing::warn!(user_id = %recipient, %kind, "failed to store notification: {}", e),
    }
}

/// GET /api/notifications
async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Paginated<NotificationResponse>>, ApiError> {
    let result = NotificationRepo::new(&state.pool)
        .list(auth.user_id, params.unread, Pagination::from(page))
        .await?;
    Ok(Json(result.map(NotificationResponse::from)))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, ApiError> {
    let count = NotificationRepo::new(&state.pool)
        .unread_count(auth.user_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

/// POST /api/notifications/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<Json<NotificationResponse>, ApiError> {
    let notification = NotificationRepo::new(&state.pool)
        .mark_read(id, auth.user_id)
        .await?;
    Ok(Json(notification.into()))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let updated = NotificationRepo::new(&state.pool)
        .mark_all_read(auth.user_id)
        .await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// DELETE /api/notifications/{id}
async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    NotificationRepo::new(&state.pool)
        .delete(id, auth.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/fix-status - repair the caller's read flags
async fn fix_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<DryRunParams>,
) -> Result<Json<StatusRepair>, ApiError> {
    let report = NotificationRepo::new(&state.pool)
        .fix_status(Some(auth.user_id), params.dry_run)
        .await?;
    Ok(Json(report))
}

/// Notification routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/fix-status", post(fix_status))
        .route("/api/notifications/{id}", delete(remove))
        .route("/api/notifications/{id}/read", post(mark_read))
}
