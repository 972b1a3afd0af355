pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod notification;
pub mod theme;

pub use chat::ChatPair;
pub use config::AmityConfig;
pub use connection::{
    plan_pair_repair, plan_request, ConnectionAction, ConnectionStatus, Edge, Outcome,
    Relationship, RepairPlan, RequestError, RequestPlan, Role, TransitionError,
};
pub use error::{AmityError, Result};
pub use notification::{NotificationKind, NotificationStatus, ReadState};
pub use theme::Theme;
