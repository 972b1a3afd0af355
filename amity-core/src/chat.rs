//! One-to-one chat pairs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AmityError;

/// Unordered pair of chat participants, stored as (low, high)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatPair {
    low: Uuid,
    high: Uuid,
}

impl ChatPair {
    pub fn new(a: Uuid, b: Uuid) -> Result<Self, AmityError> {
        if a == b {
            return Err(AmityError::SelfReference { action: "chat with" });
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    pub fn contains(&self, user: Uuid) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `me`
    pub fn other(&self, me: Uuid) -> Option<Uuid> {
        if me == self.low {
            Some(self.high)
        } else if me == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}
