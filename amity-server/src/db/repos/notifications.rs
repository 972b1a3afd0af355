//! Notification repository
//!
//! Writers always set `status` and `read` together. Readers still apply
//! the read-wins rule because older rows may disagree.

use amity_core::{NotificationKind, NotificationStatus, ReadState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DbError;
use crate::models::{Pagination, Paginated};

/// Rows that count toward the unread badge
const UNREAD: &str = "read = FALSE AND status <> 'read'";

/// Notification record from database
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub status: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn read_state(&self) -> ReadState {
        ReadState::reconcile(&self.status, self.read)
    }
}

#[derive(FromRow)]
struct CountedNotification {
    #[sqlx(flatten)]
    notification: Notification,
    total: i64,
}

/// Fields for a new notification
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: &'a str,
    pub link: Option<&'a str>,
}

/// Counts from a read-flag repair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusRepair {
    /// Rows where one flag said read and the other did not
    pub marked_read: u64,
    /// Unread rows whose status string was missing or unknown
    pub marked_unread: u64,
    pub dry_run: bool,
}

impl StatusRepair {
    pub fn total(&self) -> u64 {
        self.marked_read + self.marked_unread
    }
}

/// Notification repository
pub struct NotificationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewNotification<'_>) -> Result<Notification, DbError> {
        let notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, actor_id, kind, message, link, status, read)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.actor_id)
        .bind(new.kind.as_str())
        .bind(new.message)
        .bind(new.link)
        .bind(NotificationStatus::Unread.as_str())
        .fetch_one(self.pool)
        .await?;
        Ok(notification)
    }

    /// Notifications for `user`, newest first.
    pub async fn list(
        &self,
        user: Uuid,
        unread_only: bool,
        page: Pagination,
    ) -> Result<Paginated<Notification>, DbError> {
        let filter = format!("FROM notifications WHERE user_id = $1 AND (NOT $2 OR ({UNREAD}))");
        let sql = format!(
            r#"
            SELECT *, COUNT(*) OVER() AS total
            {filter}
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );

        let rows: Vec<CountedNotification> = sqlx::query_as(&sql)
            .bind(user)
            .bind(unread_only)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(self.pool)
            .await?;

        let total = match rows.first() {
            Some(r) => r.total,
            None if page.needs_recount(rows.len()) => {
                sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
                    .bind(user)
                    .bind(unread_only)
                    .fetch_one(self.pool)
                    .await?
            }
            None => 0,
        };
        let items = rows.into_iter().map(|r| r.notification).collect();
        Ok(Paginated::from_rows(items, total, page))
    }

    pub async fn unread_count(&self, user: Uuid) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND {UNREAD}");
        let count = sqlx::query_scalar(&sql)
            .bind(user)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Mark one notification read. Only its owner may do this.
    pub async fn mark_read(&self, id: Uuid, user: Uuid) -> Result<Notification, DbError> {
        sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = 'read', read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("notification", id))
    }

    /// Mark everything read for `user`; returns how many rows changed.
    pub async fn mark_all_read(&self, user: Uuid) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'read', read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE user_id = $1 AND (read = FALSE OR status <> 'read')
            "#,
        )
        .bind(user)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: Uuid, user: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("notification", id));
        }
        Ok(())
    }

    /// Bring `status` and `read` back in agreement.
    ///
    /// Scoped to one user when `user` is set, otherwise every row. With
    /// `dry_run` the affected rows are only counted.
    pub async fn fix_status(&self, user: Option<Uuid>, dry_run: bool) -> Result<StatusRepair, DbError> {
        // Either flag says read but they disagree
        const DISAGREE_READ: &str =
            "(read = TRUE OR status = 'read') AND NOT (read = TRUE AND status = 'read')";
        // Unread by flag with a status that is neither value
        const UNKNOWN_UNREAD: &str = "read = FALSE AND status NOT IN ('read', 'unread')";
        const SCOPE: &str = "($1::uuid IS NULL OR user_id = $1)";

        let mut report = StatusRepair {
            dry_run,
            ..StatusRepair::default()
        };

        if dry_run {
            let sql = format!(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE {DISAGREE_READ}),
                    COUNT(*) FILTER (WHERE {UNKNOWN_UNREAD})
                FROM notifications
                WHERE {SCOPE}
                "#
            );
            let (marked_read, marked_unread): (i64, i64) =
                sqlx::query_as(&sql).bind(user).fetch_one(self.pool).await?;
            report.marked_read = marked_read.max(0) as u64;
            report.marked_unread = marked_unread.max(0) as u64;
            return Ok(report);
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE notifications
            SET status = 'read', read = TRUE, read_at = COALESCE(read_at, created_at)
            WHERE {SCOPE} AND {DISAGREE_READ}
            "#
        );
        report.marked_read = sqlx::query(&sql)
            .bind(user)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let sql = format!(
            "UPDATE notifications SET status = 'unread' WHERE {SCOPE} AND {UNKNOWN_UNREAD}"
        );
        report.marked_unread = sqlx::query(&sql)
            .bind(user)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if report.total() > 0 {
            tracing::info!(
                marked_read = report.marked_read,
                marked_unread = report.marked_unread,
                "repaired notification read flags"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::testing;

    fn notification(status: &str, read: bool) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            actor_id: None,
            kind: "system".into(),
            message: "hello".into(),
            link: None,
            status: status.into(),
            read,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn read_state_follows_read_wins() {
        assert!(notification("read", false).read_state().is_read());
        assert!(notification("unread", true).read_state().is_read());
        assert!(!notification("unread", false).read_state().is_read());
        assert!(notification("unread", true).read_state().needs_repair());
        assert!(!notification("read", true).read_state().needs_repair());
    }

    async fn insert_raw(pool: &PgPool, user: Uuid, status: &str, read: bool) {
        sqlx::query(
            "INSERT INTO notifications (user_id, kind, message, status, read) VALUES ($1, 'system', 'x', $2, $3)",
        )
        .bind(user)
        .bind(status)
        .bind(read)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn read_rows_never_count_as_unread() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        insert_raw(&pool, user.id, "unread", false).await;
        insert_raw(&pool, user.id, "read", false).await;
        insert_raw(&pool, user.id, "unread", true).await;

        let repo = NotificationRepo::new(&pool);
        assert_eq!(repo.unread_count(user.id).await.unwrap(), 1);

        let unread = repo.list(user.id, true, Pagination::default()).await.unwrap();
        assert_eq!(unread.total, 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn page_past_the_end_keeps_total() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        insert_raw(&pool, user.id, "unread", false).await;
        insert_raw(&pool, user.id, "unread", false).await;

        let page = NotificationRepo::new(&pool)
            .list(user.id, false, Pagination::new(5, 2))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn fix_status_repairs_disagreeing_rows() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        insert_raw(&pool, user.id, "read", false).await;
        insert_raw(&pool, user.id, "unread", true).await;
        insert_raw(&pool, user.id, "new", false).await;
        insert_raw(&pool, user.id, "unread", false).await;

        let repo = NotificationRepo::new(&pool);
        let dry = repo.fix_status(Some(user.id), true).await.unwrap();
        assert_eq!((dry.marked_read, dry.marked_unread), (2, 1));

        let done = repo.fix_status(Some(user.id), false).await.unwrap();
        assert_eq!(done.total(), 3);
        assert_eq!(repo.fix_status(Some(user.id), false).await.unwrap().total(), 0);
        assert_eq!(repo.unread_count(user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn only_owner_can_mark_read() {
        let pool = testing::pool().await;
        let owner = testing::user(&pool).await;
        let other = testing::user(&pool).await;
        let repo = NotificationRepo::new(&pool);

        let n = repo
            .create(NewNotification {
                user_id: owner.id,
                actor_id: Some(other.id),
                kind: NotificationKind::System,
                message: "hi",
                link: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            repo.mark_read(n.id, other.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
        let read = repo.mark_read(n.id, owner.id).await.unwrap();
        assert!(read.read && read.status == "read");
    }
}
