//! Route handlers organized by resource

pub mod auth;
pub mod chat;
pub mod connections;
pub mod events;
pub mod geo;
pub mod health;
pub mod notifications;
pub mod preferences;
pub mod users;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::{TokenKeys, SESSION_HEADER};
    use crate::events::EventHub;
    use crate::geo::StaticZipLookup;
    use crate::http::server::{router, AppState, ServerConfig};
    use crate::uploads::UploadStore;

    const SECRET: &str = "routes-test-secret-that-is-long-enough-000";

    /// Router over a pool that never connects; only paths that fail
    /// before touching the database are exercised here.
    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://amity@127.0.0.1:1/amity")
            .unwrap();
        let state = AppState {
            pool,
            tokens: TokenKeys::new(SECRET, 3600).unwrap(),
            events: EventHub::new(),
            uploads: UploadStore::new(std::env::temp_dir().join("amity-routes-test"), 1024),
            geo: Arc::new(StaticZipLookup::new().with("02139", "Cambridge", "MA")),
            session_ttl: chrono::Duration::hours(1),
        };
        router(Arc::new(state), &ServerConfig::default()).unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("GET").uri(uri)
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() {
        let (status, body) = send(get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["database"], "unavailable");
    }

    #[tokio::test]
    async fn missing_token_is_401_json() {
        let (status, body) = send(get("/api/users/me").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn garbage_token_is_401() {
        let request = get("/api/notifications")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_header_must_match_token() {
        let keys = TokenKeys::new(SECRET, 3600).unwrap();
        let token = keys.issue(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let other_session = Uuid::new_v4().to_string();

        let request = get("/api/connections")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(SESSION_HEADER, other_session.as_str())
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn event_stream_requires_token() {
        let (status, _) = send(get("/api/events").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(get("/api/events?token=nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = send(get("/api/nowhere").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Handler side effects against a real database (run with `--ignored`)
    mod with_database {
        use super::*;
        use futures::Stream;
        use tokio_stream::StreamExt;

        use crate::db::repos::{testing, NotificationRepo, SessionRepo, User};
        use crate::events::EventPayload;
        use crate::models::Pagination;

        struct Live {
            app: Router,
            state: Arc<AppState>,
        }

        struct Login {
            user: User,
            session: Uuid,
            token: String,
        }

        async fn live() -> Live {
            let state = Arc::new(AppState {
                pool: testing::pool().await,
                tokens: TokenKeys::new(SECRET, 3600).unwrap(),
                events: EventHub::new(),
                uploads: UploadStore::new(std::env::temp_dir().join("amity-routes-test"), 1024),
                geo: Arc::new(StaticZipLookup::new()),
                session_ttl: chrono::Duration::hours(1),
            });
            let app = router(state.clone(), &ServerConfig::default()).unwrap();
            Live { app, state }
        }

        impl Live {
            async fn login(&self) -> Login {
                let user = testing::user(&self.state.pool).await;
                let session = SessionRepo::new(&self.state.pool)
                    .create(user.id, chrono::Duration::hours(1), None)
                    .await
                    .unwrap();
                let token = self.state.tokens.issue(user.id, session.id).unwrap();
                Login {
                    user,
                    session: session.id,
                    token,
                }
            }

            fn events_for(&self, who: &Login) -> impl Stream<Item = EventPayload> + Unpin {
                Box::pin(self.state.events.subscribe(who.user.id, who.session))
            }

            async fn post(
                &self,
                who: &Login,
                uri: &str,
                body: serde_json::Value,
            ) -> (StatusCode, serde_json::Value) {
                let request = Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {}", who.token))
                    .header(SESSION_HEADER, who.session.to_string())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap();
                let response = self.app.clone().oneshot(request).await.unwrap();
                let status = response.status();
                let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
                (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
            }

            async fn notification_kinds(&self, who: &Login) -> Vec<String> {
                NotificationRepo::new(&self.state.pool)
                    .list(who.user.id, false, Pagination::default())
                    .await
                    .unwrap()
                    .items
                    .into_iter()
                    .map(|n| n.kind)
                    .collect()
            }
        }

        async fn next_event(stream: &mut (impl Stream<Item = EventPayload> + Unpin)) -> EventPayload {
            tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("no event within 2s")
                .expect("stream ended")
        }

        fn id_of(json: &serde_json::Value) -> Uuid {
            json["id"].as_str().unwrap().parse().unwrap()
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn request_notifies_receiver() {
            let live = live().await;
            let (alice, bob) = (live.login().await, live.login().await);
            let mut bob_events = live.events_for(&bob);

            let uri = format!("/api/connections/request/{}", bob.user.id);
            let (status, body) = live.post(&alice, &uri, serde_json::json!({})).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["mutual"], false);

            assert!(matches!(
                next_event(&mut bob_events).await,
                EventPayload::ConnectionRequested { from, .. } if from == alice.user.id
            ));
            assert!(matches!(
                next_event(&mut bob_events).await,
                EventPayload::NotificationCreated { kind: amity_core::NotificationKind::ConnectionRequest, .. }
            ));
            assert_eq!(live.notification_kinds(&bob).await, vec!["connection_request"]);
            assert!(live.notification_kinds(&alice).await.is_empty());
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn accept_notifies_sender() {
            let live = live().await;
            let (alice, bob) = (live.login().await, live.login().await);

            let uri = format!("/api/connections/request/{}", bob.user.id);
            let (_, body) = live.post(&alice, &uri, serde_json::json!({})).await;
            let connection = id_of(&body["connection"]);

            let mut alice_events = live.events_for(&alice);
            let uri = format!("/api/connections/{connection}/accept");
            let (status, body) = live.post(&bob, &uri, serde_json::json!({})).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "accepted");

            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::ConnectionAccepted { connection_id, by } if connection_id == connection && by == bob.user.id
            ));
            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::NotificationCreated { kind: amity_core::NotificationKind::ConnectionAccepted, .. }
            ));
            assert_eq!(live.notification_kinds(&alice).await, vec!["connection_accepted"]);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn mutual_request_notifies_original_sender() {
            let live = live().await;
            let (alice, bob) = (live.login().await, live.login().await);

            let uri = format!("/api/connections/request/{}", bob.user.id);
            live.post(&alice, &uri, serde_json::json!({})).await;

            let mut alice_events = live.events_for(&alice);
            let uri = format!("/api/connections/request/{}", alice.user.id);
            let (status, body) = live.post(&bob, &uri, serde_json::json!({})).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["mutual"], true);
            assert_eq!(body["connection"]["status"], "accepted");

            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::ConnectionAccepted { by, .. } if by == bob.user.id
            ));
            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::NotificationCreated { kind: amity_core::NotificationKind::ConnectionAccepted, .. }
            ));
            assert_eq!(live.notification_kinds(&alice).await, vec!["connection_accepted"]);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn chat_message_notifies_recipient() {
            let live = live().await;
            let (alice, bob) = (live.login().await, live.login().await);
            let uri = format!("/api/connections/request/{}", bob.user.id);
            live.post(&alice, &uri, serde_json::json!({})).await;
            let uri = format!("/api/connections/request/{}", alice.user.id);
            live.post(&bob, &uri, serde_json::json!({})).await;

            let uri = format!("/api/chat/with/{}", alice.user.id);
            let (status, chat) = live.post(&bob, &uri, serde_json::json!({})).await;
            assert_eq!(status, StatusCode::OK);
            let chat = id_of(&chat);

            let mut alice_events = live.events_for(&alice);
            let uri = format!("/api/chat/{chat}/messages");
            let (status, message) = live
                .post(&bob, &uri, serde_json::json!({ "content": "hello there" }))
                .await;
            assert_eq!(status, StatusCode::CREATED);

            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::MessageCreated { chat_id, message_id, sender_id }
                    if chat_id == chat && message_id == id_of(&message) && sender_id == bob.user.id
            ));
            assert!(matches!(
                next_event(&mut alice_events).await,
                EventPayload::NotificationCreated { kind: amity_core::NotificationKind::Message, ref message, .. }
                    if message.contains("hello there")
            ));
            assert_eq!(
                live.notification_kinds(&alice).await,
                vec!["message", "connection_accepted"]
            );
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn logout_ends_the_event_stream() {
            let live = live().await;
            let alice = live.login().await;
            let mut events = live.events_for(&alice);

            let (status, _) = live.post(&alice, "/api/auth/logout", serde_json::json!({})).await;
            assert_eq!(status, StatusCode::NO_CONTENT);

            let end = tokio::time::timeout(Duration::from_secs(2), events.next())
                .await
                .expect("stream still open");
            assert!(end.is_none());
        }
    }
}
