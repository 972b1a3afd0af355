//! Chat endpoints
//!
//! Only connected users can open a chat or post to one. Encrypted bodies
//! are stored and returned exactly as the client sent them.

use std::sync::Arc;

use amity_core::{ChatPair, NotificationKind};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connections::UserCard;
use super::notifications::{deliver, CountResponse, UpdatedResponse};
use crate::db::repos::{Chat, ChatMessage, ChatRepo, ChatSummary, ConnectionRepo, LastMessage, NewNotification};
use crate::events::EventPayload;
use crate::http::error::ApiError;
use crate::http::extractors::{AuthUser, ValidUuid};
use crate::http::server::AppState;
use crate::models::{MessageContent, Paginated, Pagination, PaginationParams};

/// Characters of a plaintext message shown in its notification
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Chat> for ChatResponse {
    fn from(c: Chat) -> Self {
        Self {
            id: c.id,
            participants: [c.user_low, c.user_high],
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Chat list entry
#[derive(Debug, Serialize)]
pub struct ChatListItem {
    #[serde(flatten)]
    pub chat: ChatResponse,
    pub other_user: UserCard,
    /// None for a chat without messages
    pub last_message: Option<LastMessage>,
    pub unread: i64,
}

impl From<ChatSummary> for ChatListItem {
    fn from(s: ChatSummary) -> Self {
        Self {
            chat: s.chat.into(),
            other_user: s.other.into(),
            last_message: s.last_message.id.map(|_| s.last_message),
            unread: s.unread,
        }
    }
}

/// Send message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Body is a client-side encrypted base64 envelope
    #[serde(default)]
    pub encrypted: bool,
}

/// GET /api/chat
async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ChatListItem>>, ApiError> {
    let chats = ChatRepo::new(&state.pool)
        .list_for_user(auth.user_id)
        .await?;
    Ok(Json(chats.into_iter().map(ChatListItem::from).collect()))
}

/// POST /api/chat/with/{user_id} - open (or reuse) the chat with a connection
async fn open(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(other): ValidUuid,
) -> Result<Json<ChatResponse>, ApiError> {
    let pair = ChatPair::new(auth.user_id, other)?;
    require_connected(&state, auth.user_id, other).await?;

    let chat = ChatRepo::new(&state.pool).get_or_create(pair).await?;
    Ok(Json(chat.into()))
}

/// GET /api/chat/{id}/messages
async fn messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<ChatMessage>>, ApiError> {
    let repo = ChatRepo::new(&state.pool);
    repo.get(id, auth.user_id).await?;

    let page = repo.messages(id, Pagination::from(params)).await?;
    Ok(Json(page))
}

/// POST /api/chat/{id}/messages
async fn send(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let content = MessageContent::new(&req.content, req.encrypted)?;
    let repo = ChatRepo::new(&state.pool);
    let chat = repo.get(id, auth.user_id).await?;
    let recipient = chat
        .pair()?
        .other(auth.user_id)
        .ok_or_else(|| ApiError::internal(format!("chat {id} member lookup failed")))?;

    // The connection may have been removed since the chat was opened
    require_connected(&state, auth.user_id, recipient).await?;

    let message = repo.add_message(id, auth.user_id, &content).await?;
    tracing::debug!(chat_id = %id, message_id = %message.id, encrypted = message.encrypted, "message stored");

    state.events.publish(
        recipient,
        EventPayload::MessageCreated {
            chat_id: id,
            message_id: message.id,
            sender_id: auth.user_id,
        },
    );
    deliver(
        &state,
        NewNotification {
            user_id: recipient,
            actor_id: Some(auth.user_id),
            kind: NotificationKind::Message,
            message: &content.preview(PREVIEW_CHARS),
            link: Some(&format!("/chat/{id}")),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/chat/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidUuid(id): ValidUuid,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let repo = ChatRepo::new(&state.pool);
    let chat = repo.get(id, auth.user_id).await?;
    let updated = repo.mark_read(id, auth.user_id).await?;

    if updated > 0 {
        if let Some(other) = chat.pair()?.other(auth.user_id) {
            state.events.publish(
                other,
                EventPayload::MessagesRead {
                    chat_id: id,
                    reader_id: auth.user_id,
                    count: updated,
                },
            );
        }
    }

    Ok(Json(UpdatedResponse { updated }))
}

/// GET /api/chat/unread-count
async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, ApiError> {
    let count = ChatRepo::new(&state.pool).unread_total(auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn require_connected(state: &AppState, me: Uuid, other: Uuid) -> Result<(), ApiError> {
    if ConnectionRepo::new(&state.pool).are_connected(me, other).await? {
        Ok(())
    } else {
        Err(ApiError::Forbidden {
            reason: "you can only chat with your connections".into(),
        })
    }
}

/// Chat routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", get(list))
        .route("/api/chat/unread-count", get(unread_count))
        .route("/api/chat/with/{user_id}", post(open))
        .route("/api/chat/{id}/messages", get(messages).post(send))
        .route("/api/chat/{id}/read", post(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::ConnectedUser;

    fn summary(last_id: Option<Uuid>) -> ChatSummary {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        ChatSummary {
            chat: Chat {
                id: Uuid::new_v4(),
                user_low: me.min(them),
                user_high: me.max(them),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            other: ConnectedUser {
                id: them,
                username: "riley".into(),
                display_name: "Riley".into(),
                photo_path: None,
            },
            last_message: LastMessage {
                id: last_id,
                sender_id: last_id.map(|_| them),
                content: last_id.map(|_| "hey".to_string()),
                encrypted: last_id.map(|_| false),
                created_at: last_id.map(|_| Utc::now()),
            },
            unread: 0,
        }
    }

    #[test]
    fn empty_chat_has_no_last_message() {
        let json = serde_json::to_value(ChatListItem::from(summary(None))).unwrap();
        assert!(json["last_message"].is_null());
        assert_eq!(json["other_user"]["username"], "riley");
    }

    #[test]
    fn last_message_is_included() {
        let json = serde_json::to_value(ChatListItem::from(summary(Some(Uuid::new_v4())))).unwrap();
        assert_eq!(json["last_message"]["content"], "hey");
    }

    #[test]
    fn send_request_defaults_to_plaintext() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert!(!req.encrypted);
    }
}
