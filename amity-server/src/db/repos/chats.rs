//! Chat repository
//!
//! One chat per unordered pair, stored as (user_low, user_high). Message
//! bodies are opaque: an `encrypted` body is whatever envelope the client
//! sent and is never inspected here.

use amity_core::ChatPair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::connections::ConnectedUser;
use super::DbError;
use crate::models::{MessageContent, Pagination, Paginated};

/// Chat record from database
#[derive(Debug, Clone, FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn pair(&self) -> Result<ChatPair, DbError> {
        ChatPair::new(self.user_low, self.user_high)
            .map_err(|e| DbError::Corrupt(format!("chat {}: {e}", self.id)))
    }

    pub fn has_member(&self, user: Uuid) -> bool {
        self.user_low == user || self.user_high == user
    }
}

/// Chat message record from database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct CountedMessage {
    #[sqlx(flatten)]
    message: ChatMessage,
    total: i64,
}

/// Most recent message of a chat, if any
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LastMessage {
    #[sqlx(rename = "last_id")]
    pub id: Option<Uuid>,
    #[sqlx(rename = "last_sender_id")]
    pub sender_id: Option<Uuid>,
    #[sqlx(rename = "last_content")]
    pub content: Option<String>,
    #[sqlx(rename = "last_encrypted")]
    pub encrypted: Option<bool>,
    #[sqlx(rename = "last_created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Chat list entry for one user
#[derive(Debug, Clone, FromRow)]
pub struct ChatSummary {
    #[sqlx(flatten)]
    pub chat: Chat,
    #[sqlx(flatten)]
    pub other: ConnectedUser,
    #[sqlx(flatten)]
    pub last_message: LastMessage,
    pub unread: i64,
}

/// Chat repository
pub struct ChatRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Return the chat for `pair`, creating it if needed.
    pub async fn get_or_create(&self, pair: ChatPair) -> Result<Chat, DbError> {
        // DO UPDATE so RETURNING yields the row on conflict too
        let chat = sqlx::query_as(
            r#"
            INSERT INTO chats (user_low, user_high)
            VALUES ($1, $2)
            ON CONFLICT (user_low, user_high) DO UPDATE SET user_low = EXCLUDED.user_low
            RETURNING *
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(self.pool)
        .await?;
        Ok(chat)
    }

    /// Get a chat that `user` belongs to. Other users get `NotFound`.
    pub async fn get(&self, id: Uuid, user: Uuid) -> Result<Chat, DbError> {
        sqlx::query_as("SELECT * FROM chats WHERE id = $1 AND (user_low = $2 OR user_high = $2)")
            .bind(id)
            .bind(user)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("chat", id))
    }

    /// Chats of `user` with the other participant, last message and
    /// unread count, most recently active first.
    pub async fn list_for_user(&self, user: Uuid) -> Result<Vec<ChatSummary>, DbError> {
        let chats = sqlx::query_as(
            r#"
            SELECT ch.*,
                   u.id AS other_id,
                   u.username AS other_username,
                   u.display_name AS other_display_name,
                   u.photo_path AS other_photo_path,
                   lm.id AS last_id,
                   lm.sender_id AS last_sender_id,
                   lm.content AS last_content,
                   lm.encrypted AS last_encrypted,
                   lm.created_at AS last_created_at,
                   (
                       SELECT COUNT(*) FROM chat_messages m
                       WHERE m.chat_id = ch.id AND m.sender_id <> $1 AND m.read_at IS NULL
                   ) AS unread
            FROM chats ch
            JOIN users u ON u.id = CASE WHEN ch.user_low = $1 THEN ch.user_high ELSE ch.user_low END
            LEFT JOIN LATERAL (
                SELECT * FROM chat_messages m
                WHERE m.chat_id = ch.id
                ORDER BY m.created_at DESC
                LIMIT 1
            ) lm ON TRUE
            WHERE ch.user_low = $1 OR ch.user_high = $1
            ORDER BY ch.updated_at DESC
            "#,
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;
        Ok(chats)
    }

    /// Append a message and bump the chat's activity time.
    pub async fn add_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &MessageContent,
    ) -> Result<ChatMessage, DbError> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (chat_id, sender_id, content, encrypted)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(sender)
        .bind(content.as_str())
        .bind(content.is_encrypted())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Messages of a chat, newest first.
    pub async fn messages(&self, chat_id: Uuid, page: Pagination) -> Result<Paginated<ChatMessage>, DbError> {
        let rows: Vec<CountedMessage> = sqlx::query_as(
            r#"
            SELECT *, COUNT(*) OVER() AS total
            FROM chat_messages
            WHERE chat_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chat_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool)
        .await?;

        let total = match rows.first() {
            Some(r) => r.total,
            None if page.needs_recount(rows.len()) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE chat_id = $1")
                    .bind(chat_id)
                    .fetch_one(self.pool)
                    .await?
            }
            None => 0,
        };
        let items = rows.into_iter().map(|r| r.message).collect();
        Ok(Paginated::from_rows(items, total, page))
    }

    /// Mark messages from the other participant read; returns how many changed.
    pub async fn mark_read(&self, chat_id: Uuid, reader: Uuid) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages SET read_at = NOW()
            WHERE chat_id = $1 AND sender_id <> $2 AND read_at IS NULL
            "#,
        )
        .bind(chat_id)
        .bind(reader)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Unread messages across all chats of `user`.
    pub async fn unread_total(&self, user: Uuid) -> Result<i64, DbError> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM chat_messages m
            JOIN chats ch ON ch.id = m.chat_id
            WHERE (ch.user_low = $1 OR ch.user_high = $1)
              AND m.sender_id <> $1
              AND m.read_at IS NULL
            "#,
        )
        .bind(user)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
