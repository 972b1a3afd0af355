//! In-process event hub for live updates
//!
//! Handlers publish after their write commits. Each SSE subscriber gets a
//! stream filtered to its own user, so one broadcast channel serves all.

use amity_core::NotificationKind;
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

/// Buffered events per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// What happened, as sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ConnectionRequested {
        connection_id: Uuid,
        from: Uuid,
    },
    ConnectionAccepted {
        connection_id: Uuid,
        by: Uuid,
    },
    NotificationCreated {
        notification_id: Uuid,
        kind: NotificationKind,
        message: String,
    },
    MessageCreated {
        chat_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
    },
    MessagesRead {
        chat_id: Uuid,
        reader_id: Uuid,
        count: u64,
    },
    /// Ends the stream opened with this session; never forwarded
    SessionRevoked {
        session_id: Uuid,
    },
}

impl EventPayload {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionRequested { .. } => "connection_requested",
            Self::ConnectionAccepted { .. } => "connection_accepted",
            Self::NotificationCreated { .. } => "notification_created",
            Self::MessageCreated { .. } => "message_created",
            Self::MessagesRead { .. } => "messages_read",
            Self::SessionRevoked { .. } => "session_revoked",
        }
    }
}

/// An event addressed to one user
#[derive(Debug, Clone)]
pub struct Event {
    pub recipient: Uuid,
    pub payload: EventPayload,
}

/// Broadcast hub shared through `AppState`
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to `recipient`. Nobody listening is not an error.
    pub fn publish(&self, recipient: Uuid, payload: EventPayload) {
        let name = payload.name();
        match self.tx.send(Event { recipient, payload }) {
            Ok(listeners) => tracing::trace!(event = name, %recipient, listeners, "event published"),
            Err(_) => tracing::trace!(event = name, %recipient, "event dropped, no listeners"),
        }
    }

    /// Events addressed to `user`, from now on, until `session` is revoked.
    pub fn subscribe(
        &self,
        user: Uuid,
        session: Uuid,
    ) -> impl Stream<Item = EventPayload> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |result| match result {
                Ok(event) if event.recipient == user => Some(event.payload),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user, skipped, "event subscriber lagged");
                    None
                }
            })
            .take_while(move |payload| {
                !matches!(payload, EventPayload::SessionRevoked { session_id } if *session_id == session)
            })
            .filter(|payload| !matches!(payload, EventPayload::SessionRevoked { .. }))
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
