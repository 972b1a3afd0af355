//! User preference repository

use amity_core::Theme;
use sqlx::PgPool;
use uuid::Uuid;

use super::DbError;

/// Preference repository
pub struct PreferenceRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PreferenceRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Stored theme, or the default when the user never chose one.
    ///
    /// An unreadable stored value also falls back to the default.
    pub async fn get_theme(&self, user: Uuid) -> Result<Theme, DbError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT theme FROM user_preferences WHERE user_id = $1")
                .bind(user)
                .fetch_optional(self.pool)
                .await?;

        Ok(match stored {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(user_id = %user, theme = %raw, "unknown stored theme");
                Theme::default()
            }),
            None => Theme::default(),
        })
    }

    pub async fn set_theme(&self, user: Uuid, theme: Theme) -> Result<Theme, DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, theme)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET theme = EXCLUDED.theme, updated_at = NOW()
            "#,
        )
        .bind(user)
        .bind(theme.as_str())
        .execute(self.pool)
        .await?;
        Ok(theme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::testing;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn theme_defaults_then_persists() {
        let pool = testing::pool().await;
        let user = testing::user(&pool).await;
        let repo = PreferenceRepo::new(&pool);

        assert_eq!(repo.get_theme(user.id).await.unwrap(), Theme::Light);
        repo.set_theme(user.id, Theme::Dark).await.unwrap();
        repo.set_theme(user.id, Theme::System).await.unwrap();
        assert_eq!(repo.get_theme(user.id).await.unwrap(), Theme::System);
    }
}
