//! Connection (friend request) endpoints

use std::sync::Arc;

use amity_core::{ConnectionAction, NotificationKind, Relationship, RepairPlan};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::notifications::{deliver, DryRunParams};
use crate::db::repos::{
    ConnectedUser, Connection, ConnectionRepo, ConnectionWithUser, NewNotification, PairRepair,
    UserRepo,
};
use crate::events::EventPayload;
use crate::http::error::ApiError;
use crate::http::extractors::{AuthUser, ValidUuid};
use crate::http::server::AppState;
use crate::models::{Paginated, Pagination, PaginationParams};
use crate::uploads::public_url;

/// Raw connection row
#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<Connection> for ConnectionResponse {
    fn from(c: Connection) -> Self {
        Self {
            id: c.id,
            sender_id: c.sender_id,
            receiver_id: c.receiver_id,
            status: c.status,
            created_at: c.created_at,
            responded_at: c.responded_at,
        }
    }
}

/// Other user as shown in connection lists
#[derive(Debug, Serialize)]
pub struct UserCard {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

impl From<ConnectedUser> for UserCard {
    fn from(u: ConnectedUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            photo_url: u.photo_path.as_deref().map(public_url),
        }
    }
}

/// A connection from the caller's point of view
#[derive(Debug, Serialize)]
pub struct ConnectionView {
    #[serde(flatten)]
    pub connection: ConnectionResponse,
    /// Whether the caller sent the request
    pub is_sender: bool,
    pub user: UserCard,
}

impl ConnectionView {
    fn new(row: ConnectionWithUser, viewer: Uuid) -> Self {
        Self {
            is_sender: row.connection.sender_id == viewer,
            connection: row.connection.into(),
            user: row.user.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub connection: ConnectionResponse,
    /// The other user had already asked; the pair is now connected
    pub mutual: bool,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub incoming: Vec<ConnectionView>,
    pub outgoing: Vec<ConnectionView>,
}

/// Answer of the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub user_id: Uuid,
    pub status: Relationship,
    pub connection_id: Option<Uuid>,
    pub is_sender: Option<bool>,
}

impl StatusResponse {
    fn new(viewer: Uuid, other: Uuid, relationship: Relationship, winner: Option<&Connection>) -> Self {
        Self {
            user_id: other,
            status: relationship,
            connection_id: winner.map(|c| c.id),
            is_sender: winner.map(|c| c.sender_id == viewer),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub edges: Vec<ConnectionResponse>,
    pub resolved: StatusResponse,
    pub repair: RepairPlan,
}

/// POST /api/connections/request/{user_id}
async fn request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(receiver): ValidUuid,
) -> Result<(StatusCode, Json<RequestResponse>), ApiError> {
    let result = ConnectionRepo::new(&state.pool)
        .request(auth.user_id, receiver)
        .await?;
    let connection = &result.connection;
    let actor_name = display_name(&state, auth.user_id).await;

    if result.mutual {
        // Our request accepted theirs: tell the original sender
        state.events.publish(
            connection.sender_id,
            EventPayload::ConnectionAccepted {
                connection_id: connection.id,
                by: auth.user_id,
            },
        );
        deliver(
            &state,
            NewNotification {
                user_id: connection.sender_id,
                actor_id: Some(auth.user_id),
                kind: NotificationKind::ConnectionAccepted,
                message: &format!("{actor_name} accepted your connection request"),
                link: Some(&profile_link(auth.user_id)),
            },
        )
        .await;
    } else {
        state.events.publish(
            receiver,
            EventPayload::ConnectionRequested {
                connection_id: connection.id,
                from: auth.user_id,
            },
        );
        deliver(
            &state,
            NewNotification {
                user_id: receiver,
                actor_id: Some(auth.user_id),
                kind: NotificationKind::ConnectionRequest,
                message: &format!("{actor_name} sent you a connection request"),
                link: Some(&profile_link(auth.user_id)),
            },
        )
        .await;
    }

    let status = if result.mutual {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(RequestResponse {
            mutual: result.mutual,
            connection: result.connection.into(),
        }),
    ))
}

/// POST /api/connections/{id}/accept
async fn accept(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let connection = respond(&state, id, auth.user_id, ConnectionAction::Accept).await?;

    state.events.publish(
        connection.sender_id,
        EventPayload::ConnectionAccepted {
            connection_id: connection.id,
            by: auth.user_id,
        },
    );
    let actor_name = display_name(&state, auth.user_id).await;
    deliver(
        &state,
        NewNotification {
            user_id: connection.sender_id,
            actor_id: Some(auth.user_id),
            kind: NotificationKind::ConnectionAccepted,
            message: &format!("{actor_name} accepted your connection request"),
            link: Some(&profile_link(auth.user_id)),
        },
    )
    .await;

    Ok(Json(connection.into()))
}

/// POST /api/connections/{id}/decline
async fn decline(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let connection = respond(&state, id, auth.user_id, ConnectionAction::Decline).await?;
    Ok(Json(connection.into()))
}

/// DELETE /api/connections/{id} - withdraw a request or remove a connection
async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    ConnectionRepo::new(&state.pool)
        .respond(id, auth.user_id, ConnectionAction::Cancel)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn respond(
    state: &AppState,
    id: Uuid,
    actor: Uuid,
    action: ConnectionAction,
) -> Result<Connection, ApiError> {
    ConnectionRepo::new(&state.pool)
        .respond(id, actor, action)
        .await?
        .ok_or_else(|| ApiError::internal(format!("{action:?} removed connection {id}")))
}

/// GET /api/connections - accepted connections
async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<ConnectionView>>, ApiError> {
    let result = ConnectionRepo::new(&state.pool)
        .list_accepted(auth.user_id, Pagination::from(params))
        .await?;
    Ok(Json(result.map(|row| ConnectionView::new(row, auth.user_id))))
}

/// GET /api/connections/pending
async fn pending(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<PendingResponse>, ApiError> {
    let pending = ConnectionRepo::new(&state.pool)
        .list_pending(auth.user_id)
        .await?;
    let view = |rows: Vec<ConnectionWithUser>| {
        rows.into_iter()
            .map(|row| ConnectionView::new(row, auth.user_id))
            .collect()
    };

    Ok(Json(PendingResponse {
        incoming: view(pending.incoming),
        outgoing: view(pending.outgoing),
    }))
}

/// GET /api/connections/status/{user_id}
async fn status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(other): ValidUuid,
) -> Result<Json<StatusResponse>, ApiError> {
    let (relationship, winner) = ConnectionRepo::new(&state.pool)
        .relationship(auth.user_id, other)
        .await?;
    Ok(Json(StatusResponse::new(
        auth.user_id,
        other,
        relationship,
        winner.as_ref(),
    )))
}

/// GET /api/connections/debug/{user_id} - raw edges and how they resolve
async fn debug(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(other): ValidUuid,
) -> Result<Json<DebugResponse>, ApiError> {
    let rows = ConnectionRepo::new(&state.pool)
        .edges_between(auth.user_id, other)
        .await?;
    let edges = rows
        .iter()
        .map(Connection::edge)
        .collect::<Result<Vec<_>, _>>()?;

    let (relationship, winner) = Relationship::resolve(auth.user_id, &edges);
    let winner_id = winner.map(|e| e.id);
    let winner = rows.iter().find(|r| Some(r.id) == winner_id);
    let resolved = StatusResponse::new(auth.user_id, other, relationship, winner);
    let repair = amity_core::plan_pair_repair(&edges);

    Ok(Json(DebugResponse {
        edges: rows.into_iter().map(ConnectionResponse::from).collect(),
        resolved,
        repair,
    }))
}

/// POST /api/connections/fix/{user_id} - collapse the pair to one edge
async fn fix(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(other): ValidUuid,
    Query(params): Query<DryRunParams>,
) -> Result<Json<PairRepair>, ApiError> {
    if other == auth.user_id {
        return Err(ApiError::BadRequest("cannot repair a connection with yourself".into()));
    }
    let repair = ConnectionRepo::new(&state.pool)
        .repair_pair(auth.user_id, other, params.dry_run)
        .await?;
    Ok(Json(repair))
}

/// Name used in notification text; falls back to a neutral label
async fn display_name(state: &AppState, user: Uuid) -> String {
    match UserRepo::new(&state.pool).get(user).await {
        Ok(u) => u.display_name,
        Err(e) => {
            tracing::warn!(user_id = %user, "could not load display name: {}", e);
            "Someone".to_string()
        }
    }
}

fn profile_link(user: Uuid) -> String {
    format!("/profile/{user}")
}

/// Connection routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/connections", get(list))
        .route("/api/connections/pending", get(pending))
        .route("/api/connections/request/{user_id}", post(request))
        .route("/api/connections/status/{user_id}", get(status))
        .route("/api/connections/debug/{user_id}", get(debug))
        .route("/api/connections/fix/{user_id}", post(fix))
        .route("/api/connections/{id}", delete(remove))
        .route("/api/connections/{id}/accept", post(accept))
        .route("/api/connections/{id}/decline", post(decline))
}
