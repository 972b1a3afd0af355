//! User repository
//!
//! Accounts and profiles live in one row.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{is_unique_violation, DbError};
use crate::models::{DisplayName, Email, Pagination, Paginated, Username};

/// Other users matching an optional name pattern ($2) and ZIP code ($3)
const SEARCH_FILTER: &str = r#"
    FROM users
    WHERE id <> $1
      AND ($2::text IS NULL OR username ILIKE $2 OR display_name ILIKE $2)
      AND ($3::text IS NULL OR zip_code = $3)
"#;

/// User record from database
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub interests: Vec<String>,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct CountedUser {
    #[sqlx(flatten)]
    user: User,
    total: i64,
}

/// Fields for a new account
pub struct NewUser<'a> {
    pub username: &'a Username,
    pub email: &'a Email,
    pub password_hash: &'a str,
    pub display_name: &'a DisplayName,
}

/// Partial profile update; `None` leaves a column unchanged.
///
/// Values are already validated by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub interests: Option<Vec<String>>,
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an account. Duplicate username or email is a conflict.
    pub async fn create(&self, new: NewUser<'_>) -> Result<User, DbError> {
        sqlx::query_as(
            r#"
            INSERT INTO users (username, email, password_hash, display_name)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.username.as_str())
        .bind(new.email.as_str())
        .bind(new.password_hash)
        .bind(new.display_name.as_str())
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict("username or email is already registered".into())
            } else {
                DbError::Sqlx(e)
            }
        })
    }

    /// Get a user by id.
    pub async fn get(&self, id: Uuid) -> Result<User, DbError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Find by username or email (case-insensitive) for login.
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>, DbError> {
        let login = login.trim().to_lowercase();
        let user = sqlx::query_as("SELECT * FROM users WHERE username = $1 OR email = $1 LIMIT 1")
            .bind(&login)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Apply a partial profile update.
    pub async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, DbError> {
        sqlx::query_as(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                bio = COALESCE($3, bio),
                gender = COALESCE($4, gender),
                birth_date = COALESCE($5, birth_date),
                zip_code = COALESCE($6, zip_code),
                city = COALESCE($7, city),
                region = COALESCE($8, region),
                interests = COALESCE($9, interests),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.display_name)
        .bind(&update.bio)
        .bind(&update.gender)
        .bind(update.birth_date)
        .bind(&update.zip_code)
        .bind(&update.city)
        .bind(&update.region)
        .bind(&update.interests)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Replace the profile photo path, returning the previous one.
    pub async fn set_photo(&self, id: Uuid, path: &str) -> Result<Option<String>, DbError> {
        let previous: Option<Option<String>> = sqlx::query_scalar(
            r#"
            WITH old AS (SELECT photo_path FROM users WHERE id = $1)
            UPDATE users SET photo_path = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING (SELECT photo_path FROM old)
            "#,
        )
        .bind(id)
        .bind(path)
        .fetch_optional(self.pool)
        .await?;

        previous.ok_or_else(|| DbError::not_found("user", id))
    }

    /// Record activity for "recently active" ordering.
    pub async fn touch_last_seen(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_seen_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Search other users by name and/or ZIP code, most recently active first.
    pub async fn search(
        &self,
        viewer: Uuid,
        query: Option<&str>,
        zip: Option<&str>,
        page: Pagination,
    ) -> Result<Paginated<User>, DbError> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let rows: Vec<CountedUser> = sqlx::query_as(&format!(
            r#"
            SELECT *, COUNT(*) OVER() AS total
            {SEARCH_FILTER}
            ORDER BY last_seen_at DESC NULLS LAST, created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(viewer)
        .bind(pattern.as_deref())
        .bind(zip)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool)
        .await?;

        let total = match rows.first() {
            Some(r) => r.total,
            None if page.needs_recount(rows.len()) => {
                sqlx::query_scalar(&format!("SELECT COUNT(*) {SEARCH_FILTER}"))
                    .bind(viewer)
                    .bind(pattern.as_deref())
                    .bind(zip)
                    .fetch_one(self.pool)
                    .await?
            }
            None => 0,
        };
        let items = rows.into_iter().map(|r| r.user).collect();
        Ok(Paginated::from_rows(items, total, page))
    }
}

/// Escape LIKE wildcards in user input
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
