//! Server-sent events stream of live updates for the caller

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::Stream;
use tokio_stream::StreamExt;

use crate::db::repos::UserRepo;
use crate::events::EventPayload;
use crate::http::error::ApiError;
use crate::http::extractors::StreamAuthUser;
use crate::http::server::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// GET /api/events
async fn stream(
    State(state): State<Arc<AppState>>,
    StreamAuthUser(auth): StreamAuthUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    UserRepo::new(&state.pool).touch_last_seen(auth.user_id).await?;
    tracing::debug!(
        user_id = %auth.user_id,
        subscribers = state.events.subscriber_count() + 1,
        "event stream opened"
    );

    let events = state
        .events
        .subscribe(auth.user_id, auth.session_id)
        .map(|payload| Ok::<_, Infallible>(to_sse(&payload)));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

fn to_sse(payload: &EventPayload) -> Event {
    let event = Event::default().event(payload.name());
    match serde_json::to_string(payload) {
        Ok(json) => event.data(json),
        Err(e) => {
            tracing::warn!(event = payload.name(), "failed to encode event: {}", e);
            event.data("{}")
        }
    }
}

/// Event stream routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(stream))
}
