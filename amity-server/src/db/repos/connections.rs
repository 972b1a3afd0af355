//! Connection repository
//!
//! Every write that depends on the edges between a pair takes a
//! transaction-scoped advisory lock on the unordered pair first, so two
//! users requesting each other at the same moment cannot both insert.

use amity_core::{
    plan_pair_repair, plan_request, ConnectionAction, ConnectionStatus, Edge, Outcome,
    Relationship, RepairPlan, RequestError, RequestPlan,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::DbError;
use crate::models::{Pagination, Paginated};

/// Connection record from database
#[derive(Debug, Clone, FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn status(&self) -> Result<ConnectionStatus, DbError> {
        self.status
            .parse()
            .map_err(|e: amity_core::AmityError| DbError::Corrupt(format!("connection {}: {e}", self.id)))
    }

    pub fn edge(&self) -> Result<Edge, DbError> {
        Ok(Edge {
            id: self.id,
            sender: self.sender_id,
            receiver: self.receiver_id,
            status: self.status()?,
            created_at: self.created_at,
        })
    }

    /// The participant that is not `me`
    pub fn other(&self, me: Uuid) -> Uuid {
        if self.sender_id == me {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// Public card of the user on the other end of a connection
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConnectedUser {
    #[sqlx(rename = "other_id")]
    pub id: Uuid,
    #[sqlx(rename = "other_username")]
    pub username: String,
    #[sqlx(rename = "other_display_name")]
    pub display_name: String,
    #[sqlx(rename = "other_photo_path")]
    pub photo_path: Option<String>,
}

/// Connection joined with the other participant
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionWithUser {
    #[sqlx(flatten)]
    pub connection: Connection,
    #[sqlx(flatten)]
    pub user: ConnectedUser,
}

#[derive(FromRow)]
struct CountedConnection {
    #[sqlx(flatten)]
    row: ConnectionWithUser,
    total: i64,
}

/// Pending requests seen from one user
#[derive(Debug, Clone, Default)]
pub struct PendingConnections {
    /// Requests waiting for this user's answer
    pub incoming: Vec<ConnectionWithUser>,
    /// Requests this user sent that are still open
    pub outgoing: Vec<ConnectionWithUser>,
}

/// Result of a connection request
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub connection: Connection,
    /// The other user had already asked, so the pair is now connected
    pub mutual: bool,
}

/// Outcome of a pair repair
#[derive(Debug, Clone, Serialize)]
pub struct PairRepair {
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub plan: RepairPlan,
    pub applied: bool,
}

const WITH_OTHER_USER: &str = r#"
    SELECT c.*,
           u.id AS other_id,
           u.username AS other_username,
           u.display_name AS other_display_name,
           u.photo_path AS other_photo_path
    FROM connections c
    JOIN users u ON u.id = CASE WHEN c.sender_id = $1 THEN c.receiver_id ELSE c.sender_id END
"#;

/// Connection repository
pub struct ConnectionRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ConnectionRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Send a request from `sender` to `receiver`.
    pub async fn request(&self, sender: Uuid, receiver: Uuid) -> Result<RequestResult, DbError> {
        if sender == receiver {
            return Err(request_error(RequestError::SelfRequest));
        }

        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, sender, receiver).await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(receiver)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(DbError::not_found("user", receiver));
        }

        let rows = pair_edges(&mut tx, sender, receiver).await?;
        let edges = to_edges(&rows)?;
        let plan = plan_request(sender, receiver, &edges).map_err(request_error)?;

        let result = match plan {
            RequestPlan::Create { stale_reverse } => {
                if let Some(stale) = stale_reverse {
                    sqlx::query("DELETE FROM connections WHERE id = $1")
                        .bind(stale)
                        .execute(&mut *tx)
                        .await?;
                }
                let connection = sqlx::query_as(
                    r#"
                    INSERT INTO connections (sender_id, receiver_id, status)
                    VALUES ($1, $2, 'pending')
                    RETURNING *
                    "#,
                )
                .bind(sender)
                .bind(receiver)
                .fetch_one(&mut *tx)
                .await?;
                RequestResult { connection, mutual: false }
            }
            RequestPlan::Reopen(id) => {
                let connection = sqlx::query_as(
                    r#"
                    UPDATE connections
                    SET status = 'pending', responded_at = NULL, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                RequestResult { connection, mutual: false }
            }
            RequestPlan::AcceptReverse(id) => {
                let connection = set_status(&mut tx, id, ConnectionStatus::Accepted).await?;
                RequestResult { connection, mutual: true }
            }
        };

        tx.commit().await?;

        tracing::debug!(
            %sender,
            %receiver,
            mutual = result.mutual,
            "connection requested"
        );
        Ok(result)
    }

    /// Accept, decline or cancel a connection as `actor`.
    ///
    /// Returns the updated row, or `None` when the edge was removed.
    /// Users who are not on the edge get `NotFound`.
    pub async fn respond(
        &self,
        id: Uuid,
        actor: Uuid,
        action: ConnectionAction,
    ) -> Result<Option<Connection>, DbError> {
        let current = self.get(id).await?;
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, current.sender_id, current.receiver_id).await?;

        // Re-read under the lock
        let current: Connection = sqlx::query_as("SELECT * FROM connections WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("connection", id))?;

        let edge = current.edge()?;
        let role = edge
            .role_of(actor)
            .ok_or_else(|| DbError::not_found("connection", id))?;

        let outcome = edge
            .status
            .apply(action, role)
            .map_err(|e| DbError::Conflict(e.to_string()))?;

        let updated = match outcome {
            Outcome::Status(status) => Some(set_status(&mut tx, id, status).await?),
            Outcome::Removed => {
                sqlx::query("DELETE FROM connections WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                None
            }
        };

        tx.commit().await?;
        Ok(updated)
    }

    /// Get a connection by id.
    pub async fn get(&self, id: Uuid) -> Result<Connection, DbError> {
        sqlx::query_as("SELECT * FROM connections WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("connection", id))
    }

    /// Accepted connections of `user`, newest first.
    pub async fn list_accepted(
        &self,
        user: Uuid,
        page: Pagination,
    ) -> Result<Paginated<ConnectionWithUser>, DbError> {
        let accepted = format!(
            "({WITH_OTHER_USER} WHERE (c.sender_id = $1 OR c.receiver_id = $1) AND c.status = 'accepted') AS accepted"
        );
        let sql = format!(
            r#"
            SELECT *, COUNT(*) OVER() AS total FROM {accepted}
            ORDER BY COALESCE(responded_at, updated_at) DESC
            LIMIT $2 OFFSET $3
            "#
        );

        let rows: Vec<CountedConnection> = sqlx::query_as(&sql)
            .bind(user)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(self.pool)
            .await?;

        let total = match rows.first() {
            Some(r) => r.total,
            None if page.needs_recount(rows.len()) => {
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {accepted}"))
                    .bind(user)
                    .fetch_one(self.pool)
                    .await?
            }
            None => 0,
        };
        let items = rows.into_iter().map(|r| r.row).collect();
        Ok(Paginated::from_rows(items, total, page))
    }

    /// Pending requests to and from `user`.
    pub async fn list_pending(&self, user: Uuid) -> Result<PendingConnections, DbError> {
        let sql = format!(
            r#"{WITH_OTHER_USER}
            WHERE (c.sender_id = $1 OR c.receiver_id = $1) AND c.status = 'pending'
            ORDER BY c.created_at DESC
            "#
        );

        let rows: Vec<ConnectionWithUser> = sqlx::query_as(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?;

        let (incoming, outgoing) = rows
            .into_iter()
            .partition(|r| r.connection.receiver_id == user);
        Ok(PendingConnections { incoming, outgoing })
    }

    /// Every edge between `a` and `b`, in either direction.
    pub async fn edges_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Connection>, DbError> {
        let mut conn = self.pool.acquire().await?;
        pair_edges(&mut conn, a, b).await
    }

    /// How `viewer` relates to `other`, with the edge that decided it.
    pub async fn relationship(
        &self,
        viewer: Uuid,
        other: Uuid,
    ) -> Result<(Relationship, Option<Connection>), DbError> {
        let rows = self.edges_between(viewer, other).await?;
        let edges = to_edges(&rows)?;
        let (relationship, winner) = Relationship::resolve(viewer, &edges);
        let winner_id = winner.map(|e| e.id);
        let connection = rows.into_iter().find(|r| Some(r.id) == winner_id);
        Ok((relationship, connection))
    }

    /// Whether `a` and `b` have an accepted connection in either direction.
    pub async fn are_connected(&self, a: Uuid, b: Uuid) -> Result<bool, DbError> {
        let connected: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM connections
                WHERE status = 'accepted'
                  AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(self.pool)
        .await?;
        Ok(connected)
    }

    /// Collapse the edges between `a` and `b` to at most one.
    pub async fn repair_pair(&self, a: Uuid, b: Uuid, dry_run: bool) -> Result<PairRepair, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, a, b).await?;

        let rows = pair_edges(&mut tx, a, b).await?;
        let plan = plan_pair_repair(&to_edges(&rows)?);
        let applied = !dry_run && !plan.is_noop();

        if applied {
            if !plan.delete.is_empty() {
                sqlx::query("DELETE FROM connections WHERE id = ANY($1)")
                    .bind(&plan.delete)
                    .execute(&mut *tx)
                    .await?;
            }
            if let (Some(keep), Some(status)) = (plan.keep, plan.set_status) {
                set_status(&mut tx, keep, status).await?;
            }
        }

        tx.commit().await?;

        let (user_low, user_high) = if a < b { (a, b) } else { (b, a) };
        if applied {
            tracing::info!(%user_low, %user_high, deleted = plan.delete.len(), "repaired connection pair");
        }
        Ok(PairRepair {
            user_low,
            user_high,
            plan,
            applied,
        })
    }

    /// Pairs that have edges in both directions.
    pub async fn bidirectional_pairs(&self) -> Result<Vec<(Uuid, Uuid)>, DbError> {
        let pairs = sqlx::query_as(
            r#"
            SELECT DISTINCT LEAST(c.sender_id, c.receiver_id), GREATEST(c.sender_id, c.receiver_id)
            FROM connections c
            JOIN connections r ON r.sender_id = c.receiver_id AND r.receiver_id = c.sender_id
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(pairs)
    }
}

fn request_error(err: RequestError) -> DbError {
    match err {
        RequestError::SelfRequest => DbError::Invalid(err.to_string()),
        RequestError::AlreadyConnected | RequestError::AlreadyPending => DbError::Conflict(err.to_string()),
    }
}

fn to_edges(rows: &[Connection]) -> Result<Vec<Edge>, DbError> {
    rows.iter().map(Connection::edge).collect()
}

/// Serialize writes for one unordered pair until the transaction ends
async fn lock_pair(conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<(), DbError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(pair_key(a, b))
        .execute(conn)
        .await?;
    Ok(())
}

fn pair_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    format!("connections:{low}:{high}")
}

async fn pair_edges(conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<Vec<Connection>, DbError> {
    let rows = sqlx::query_as(
        r#"
        SELECT * FROM connections
        WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)
        ORDER BY created_at, id
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: ConnectionStatus,
) -> Result<Connection, DbError> {
    let connection = sqlx::query_as(
        r#"
        UPDATE connections
        SET status = $2, responded_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_one(conn)
    .await?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::testing;

    #[test]
    fn pair_key_is_unordered() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn request_errors_map_to_db_errors() {
        assert!(matches!(request_error(RequestError::SelfRequest), DbError::Invalid(_)));
        assert!(matches!(request_error(RequestError::AlreadyPending), DbError::Conflict(_)));
        assert!(matches!(request_error(RequestError::AlreadyConnected), DbError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn request_accept_flow() {
        let pool = testing::pool().await;
        let alice = testing::user(&pool).await;
        let bob = testing::user(&pool).await;
        let repo = ConnectionRepo::new(&pool);

        let req = repo.request(alice.id, bob.id).await.unwrap();
        assert!(!req.mutual);
        assert!(matches!(
            repo.request(alice.id, bob.id).await.unwrap_err(),
            DbError::Conflict(_)
        ));

        // sender cannot accept their own request
        assert!(matches!(
            repo.respond(req.connection.id, alice.id, ConnectionAction::Accept)
                .await
                .unwrap_err(),
            DbError::Conflict(_)
        ));

        let accepted = repo
            .respond(req.connection.id, bob.id, ConnectionAction::Accept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, "accepted");
        assert!(repo.are_connected(bob.id, alice.id).await.unwrap());

        let (rel, _) = repo.relationship(alice.id, bob.id).await.unwrap();
        assert_eq!(rel, Relationship::Connected);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn crossing_requests_connect() {
        let pool = testing::pool().await;
        let alice = testing::user(&pool).await;
        let bob = testing::user(&pool).await;
        let repo = ConnectionRepo::new(&pool);

        repo.request(alice.id, bob.id).await.unwrap();
        let second = repo.request(bob.id, alice.id).await.unwrap();
        assert!(second.mutual);
        assert_eq!(repo.edges_between(alice.id, bob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn outsiders_cannot_see_connection() {
        let pool = testing::pool().await;
        let alice = testing::user(&pool).await;
        let bob = testing::user(&pool).await;
        let eve = testing::user(&pool).await;
        let repo = ConnectionRepo::new(&pool);

        let req = repo.request(alice.id, bob.id).await.unwrap();
        assert!(matches!(
            repo.respond(req.connection.id, eve.id, ConnectionAction::Decline)
                .await
                .unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn repair_collapses_legacy_pairs() {
        let pool = testing::pool().await;
        let alice = testing::user(&pool).await;
        let bob = testing::user(&pool).await;

        // Legacy data: both directions pending
        sqlx::query(
            "INSERT INTO connections (sender_id, receiver_id, status) VALUES ($1, $2, 'pending'), ($2, $1, 'pending')",
        )
        .bind(alice.id)
        .bind(bob.id)
        .execute(&pool)
        .await
        .unwrap();

        let repo = ConnectionRepo::new(&pool);
        let dry = repo.repair_pair(alice.id, bob.id, true).await.unwrap();
        assert!(!dry.applied);
        assert_eq!(repo.edges_between(alice.id, bob.id).await.unwrap().len(), 2);

        let done = repo.repair_pair(alice.id, bob.id, false).await.unwrap();
        assert!(done.applied);
        let edges = repo.edges_between(alice.id, bob.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].status, "accepted");
    }
}
