//! Session repository
//!
//! A session backs every issued token. Logout revokes it, so a token that
//! is still cryptographically valid stops working immediately.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DbError;

/// Session record from database
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Session repository
pub struct SessionRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a session for `user_id` that lives for `ttl`.
    pub async fn create(
        &self,
        user_id: Uuid,
        ttl: Duration,
        user_agent: Option<&str>,
    ) -> Result<Session, DbError> {
        let session = sqlx::query_as(
            r#"
            INSERT INTO sessions (user_id, expires_at, user_agent)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(Utc::now() + ttl)
        .bind(user_agent)
        .fetch_one(self.pool)
        .await?;
        Ok(session)
    }

    /// Whether `session_id` belongs to `user_id` and is neither expired nor revoked.
    pub async fn is_active(&self, session_id: Uuid, user_id: Uuid) -> Result<bool, DbError> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sessions
                WHERE id = $1 AND user_id = $2
                  AND revoked_at IS NULL AND expires_at > NOW()
            )
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(active)
    }

    /// Revoke a session. Revoking twice is not an error.
    pub async fn revoke(&self, session_id: Uuid, user_id: Uuid) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = COALESCE(revoked_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete sessions that expired or were revoked more than a day ago.
    /// With `dry_run` they are only counted.
    pub async fn purge_expired(&self, dry_run: bool) -> Result<u64, DbError> {
        if dry_run {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM sessions
                WHERE expires_at < NOW()
                   OR revoked_at < NOW() - INTERVAL '1 day'
                "#,
            )
            .fetch_one(self.pool)
            .await?;
            return Ok(count.max(0) as u64);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
               OR revoked_at < NOW() - INTERVAL '1 day'
            "#,
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::testing;

    #[test]
    fn activity_window() {
        let now = Utc::now();
        let mut session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            user_agent: None,
        };
        assert!(session.is_active_at(now));
        assert!(!session.is_active_at(now + Duration::hours(2)));

        session.revoked_at = Some(now);
        assert!(!session.is_active_at(now));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn revoke_deactivates() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        let repo = SessionRepo::new(&pool);

        let session = repo.create(user.id, Duration::hours(1), Some("test")).await.unwrap();
        assert!(repo.is_active(session.id, user.id).await.unwrap());
        assert!(!repo.is_active(session.id, Uuid::new_v4()).await.unwrap());

        repo.revoke(session.id, user.id).await.unwrap();
        repo.revoke(session.id, user.id).await.unwrap();
        assert!(!repo.is_active(session.id, user.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn purge_removes_only_dead_sessions() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        let repo = SessionRepo::new(&pool);

        let live = repo.create(user.id, Duration::hours(1), None).await.unwrap();
        let expired = repo.create(user.id, Duration::hours(-1), None).await.unwrap();

        let would = repo.purge_expired(true).await.unwrap();
        assert!(would >= 1);
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = $1)")
            .bind(expired.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(exists, "dry run must not delete");

        assert!(repo.purge_expired(false).await.unwrap() >= 1);
        let remaining: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM sessions WHERE user_id = $1")
            .bind(user.id)
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, vec![live.id]);
    }
}
