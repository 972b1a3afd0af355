//! Notification kinds and read-state reconciliation
//!
//! Stored notifications carry two read signals: a `status` string and a
//! `read` boolean. Older writers did not always update both. The rule is
//! that read wins: if either signal says read, the notification is read
//! and must not be counted in the unread badge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AmityError;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ConnectionRequest,
    ConnectionAccepted,
    Message,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::ConnectionAccepted => "connection_accepted",
            Self::Message => "message",
            Self::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = AmityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection_request" => Ok(Self::ConnectionRequest),
            "connection_accepted" => Ok(Self::ConnectionAccepted),
            "message" => Ok(Self::Message),
            "system" => Ok(Self::System),
            other => Err(AmityError::unknown_variant("notification kind", other)),
        }
    }
}

/// Value of the `status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = AmityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(Self::Unread),
            "read" => Ok(Self::Read),
            other => Err(AmityError::unknown_variant("notification status", other)),
        }
    }
}

/// Reconciled read state of a stored notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    status: Option<NotificationStatus>,
    read: bool,
}

impl ReadState {
    /// Build from the raw stored columns. Unknown status strings are kept
    /// as `None` so they can be repaired.
    pub fn reconcile(status: &str, read: bool) -> Self {
        Self {
            status: status.parse().ok(),
            read,
        }
    }

    /// Whether the notification counts as read
    pub fn is_read(&self) -> bool {
        self.read || self.status == Some(NotificationStatus::Read)
    }

    /// Canonical `(status, read)` pair for this notification
    pub fn repaired(&self) -> (NotificationStatus, bool) {
        if self.is_read() {
            (NotificationStatus::Read, true)
        } else {
            (NotificationStatus::Unread, false)
        }
    }

    /// Whether the stored columns disagree with the canonical pair
    pub fn needs_repair(&self) -> bool {
        let (status, read) = self.repaired();
        self.status != Some(status) || self.read != read
    }
}
