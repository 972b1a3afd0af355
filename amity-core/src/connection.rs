//! Connection (friend request) rules
//!
//! A connection is a directed edge `sender -> receiver` with a status.
//! The database holds at most one edge per ordered pair, but both
//! directions may exist at once. Everything here is pure: repositories
//! load the edges for a pair, ask this module what to do, and apply it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AmityError;

/// Status of a connection edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    /// Apply an action taken by one side of the edge.
    pub fn apply(self, action: ConnectionAction, role: Role) -> Result<Outcome, TransitionError> {
        use ConnectionAction::*;
        use ConnectionStatus::*;

        match (self, action, role) {
            (Pending, Accept, Role::Receiver) => Ok(Outcome::Status(Accepted)),
            (Pending, Decline, Role::Receiver) => Ok(Outcome::Status(Declined)),
            (Pending | Declined, Cancel, Role::Sender) => Ok(Outcome::Removed),
            (Accepted, Cancel, _) => Ok(Outcome::Removed),
            (status, action, role) => Err(TransitionError {
                from: status,
                action,
                role,
            }),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = AmityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(AmityError::unknown_variant("connection status", other)),
        }
    }
}

/// Something a user does to an existing edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Accept,
    Decline,
    /// Withdraw a request, or remove an accepted connection
    Cancel,
}

/// Which end of the edge the acting user is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

/// Result of a valid transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Status(ConnectionStatus),
    Removed,
}

/// An action that is not allowed from the current status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action:?} a {from} connection as {role:?}")]
pub struct TransitionError {
    pub from: ConnectionStatus,
    pub action: ConnectionAction,
    pub role: Role,
}

/// Minimal view of a stored edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Role of `user` on this edge, if they are on it at all
    pub fn role_of(&self, user: Uuid) -> Option<Role> {
        if self.sender == user {
            Some(Role::Sender)
        } else if self.receiver == user {
            Some(Role::Receiver)
        } else {
            None
        }
    }

    fn is(&self, sender: Uuid, receiver: Uuid) -> bool {
        self.sender == sender && self.receiver == receiver
    }
}

/// What a new request from `sender` to `receiver` should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPlan {
    /// Insert a new pending edge, dropping a stale declined edge the
    /// other way if there is one
    Create { stale_reverse: Option<Uuid> },
    /// Re-open a previously declined edge in the same direction
    Reopen(Uuid),
    /// The other user already asked; accept their edge instead
    AcceptReverse(Uuid),
}

/// Why a request cannot be made
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("cannot send a connection request to yourself")]
    SelfRequest,
    #[error("already connected")]
    AlreadyConnected,
    #[error("a request is already pending")]
    AlreadyPending,
}

/// Decide how to handle a request given the edges already between the pair.
pub fn plan_request(sender: Uuid, receiver: Uuid, edges: &[Edge]) -> Result<RequestPlan, RequestError> {
    if sender == receiver {
        return Err(RequestError::SelfRequest);
    }

    let forward = edges.iter().find(|e| e.is(sender, receiver));
    let reverse = edges.iter().find(|e| e.is(receiver, sender));

    if forward.map(|e| e.status) == Some(ConnectionStatus::Accepted)
        || reverse.map(|e| e.status) == Some(ConnectionStatus::Accepted)
    {
        return Err(RequestError::AlreadyConnected);
    }

    if let Some(rev) = reverse {
        if rev.status == ConnectionStatus::Pending {
            return Ok(RequestPlan::AcceptReverse(rev.id));
        }
    }

    match forward {
        Some(fwd) if fwd.status == ConnectionStatus::Pending => Err(RequestError::AlreadyPending),
        Some(fwd) => Ok(RequestPlan::Reopen(fwd.id)),
        None => Ok(RequestPlan::Create {
            stale_reverse: reverse.map(|e| e.id),
        }),
    }
}

/// Relationship between a viewer and another user, as shown in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    None,
    PendingSent,
    PendingReceived,
    Connected,
    DeclinedSent,
    DeclinedReceived,
}

impl Relationship {
    /// Resolve the relationship from every edge between the pair.
    ///
    /// When both directions exist the stronger one wins:
    /// Connected > PendingReceived > PendingSent > DeclinedReceived > DeclinedSent.
    /// Returns the winning edge alongside so callers can act on its id.
    pub fn resolve<'a>(viewer: Uuid, edges: &'a [Edge]) -> (Self, Option<&'a Edge>) {
        edges
            .iter()
            .filter_map(|edge| {
                let rel = match (edge.status, edge.role_of(viewer)?) {
                    (ConnectionStatus::Accepted, _) => Self::Connected,
                    (ConnectionStatus::Pending, Role::Receiver) => Self::PendingReceived,
                    (ConnectionStatus::Pending, Role::Sender) => Self::PendingSent,
                    (ConnectionStatus::Declined, Role::Receiver) => Self::DeclinedReceived,
                    (ConnectionStatus::Declined, Role::Sender) => Self::DeclinedSent,
                };
                Some((rel, edge))
            })
            .max_by_key(|(rel, _)| rel.rank())
            .map(|(rel, edge)| (rel, Some(edge)))
            .unwrap_or((Self::None, None))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::DeclinedSent => 1,
            Self::DeclinedReceived => 2,
            Self::PendingSent => 3,
            Self::PendingReceived => 4,
            Self::Connected => 5,
        }
    }
}

/// Changes needed to collapse a pair down to a single edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairPlan {
    pub keep: Option<Uuid>,
    pub set_status: Option<ConnectionStatus>,
    pub delete: Vec<Uuid>,
}

impl RepairPlan {
    pub fn is_noop(&self) -> bool {
        self.set_status.is_none() && self.delete.is_empty()
    }
}

/// Plan a repair for all edges between one pair of users.
///
/// - oldest accepted edge wins, everything else goes
/// - two pending edges mean mutual interest: keep the older, accept it
/// - pending beats declined
/// - two declined edges: keep the newer
pub fn plan_pair_repair(edges: &[Edge]) -> RepairPlan {
    if edges.len() < 2 {
        return RepairPlan {
            keep: edges.first().map(|e| e.id),
            ..RepairPlan::default()
        };
    }

    let mut sorted: Vec<&Edge> = edges.iter().collect();
    sorted.sort_by_key(|e| (e.created_at, e.id));

    let by_status = |status: ConnectionStatus| sorted.iter().copied().filter(move |e| e.status == status);

    let pendings: Vec<&Edge> = by_status(ConnectionStatus::Pending).collect();
    let (keep, set_status) = if let Some(acc) = by_status(ConnectionStatus::Accepted).next() {
        (acc, None)
    } else if pendings.len() >= 2 {
        (pendings[0], Some(ConnectionStatus::Accepted))
    } else if let Some(pending) = pendings.first() {
        (*pending, None)
    } else {
        // all declined; sorted is non-empty here
        (sorted[sorted.len() - 1], None)
    };

    RepairPlan {
        keep: Some(keep.id),
        set_status,
        delete: sorted
            .iter()
            .filter(|e| e.id != keep.id)
            .map(|e| e.id)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn edge(sender: Uuid, receiver: Uuid, status: ConnectionStatus, age_secs: i64) -> Edge {
        Edge {
            id: Uuid::new_v4(),
            sender,
            receiver,
            status,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn pair() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ConnectionStatus::Pending,
            ConnectionStatus::Accepted,
            ConnectionStatus::Declined,
        ] {
            assert_eq!(status.as_str().parse::<ConnectionStatus>().unwrap(), status);
        }
        assert!("blocked".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn receiver_accepts_or_declines_pending() {
        let p = ConnectionStatus::Pending;
        assert_eq!(
            p.apply(ConnectionAction::Accept, Role::Receiver),
            Ok(Outcome::Status(ConnectionStatus::Accepted))
        );
        assert_eq!(
            p.apply(ConnectionAction::Decline, Role::Receiver),
            Ok(Outcome::Status(ConnectionStatus::Declined))
        );
    }

    #[test]
    fn sender_cannot_accept_own_request() {
        let err = ConnectionStatus::Pending
            .apply(ConnectionAction::Accept, Role::Sender)
            .unwrap_err();
        assert_eq!(err.from, ConnectionStatus::Pending);
    }

    #[test]
    fn cancel_rules() {
        use ConnectionAction::Cancel;
        assert_eq!(ConnectionStatus::Pending.apply(Cancel, Role::Sender), Ok(Outcome::Removed));
        assert!(ConnectionStatus::Pending.apply(Cancel, Role::Receiver).is_err());
        assert_eq!(ConnectionStatus::Accepted.apply(Cancel, Role::Receiver), Ok(Outcome::Removed));
        assert_eq!(ConnectionStatus::Accepted.apply(Cancel, Role::Sender), Ok(Outcome::Removed));
        assert_eq!(ConnectionStatus::Declined.apply(Cancel, Role::Sender), Ok(Outcome::Removed));
        assert!(ConnectionStatus::Declined.apply(Cancel, Role::Receiver).is_err());
    }

    #[test]
    fn accepted_is_terminal_for_accept_and_decline() {
        let s = ConnectionStatus::Accepted;
        assert!(s.apply(ConnectionAction::Accept, Role::Receiver).is_err());
        assert!(s.apply(ConnectionAction::Decline, Role::Receiver).is_err());
    }

    #[test]
    fn plan_request_fresh_pair() {
        let (a, b) = pair();
        assert_eq!(
            plan_request(a, b, &[]),
            Ok(RequestPlan::Create { stale_reverse: None })
        );
    }

    #[test]
    fn plan_request_rejects_self() {
        let (a, _) = pair();
        assert_eq!(plan_request(a, a, &[]), Err(RequestError::SelfRequest));
    }

    #[test]
    fn plan_request_mutual_interest_accepts_reverse() {
        let (a, b) = pair();
        let rev = edge(b, a, ConnectionStatus::Pending, 10);
        assert_eq!(
            plan_request(a, b, std::slice::from_ref(&rev)),
            Ok(RequestPlan::AcceptReverse(rev.id))
        );
    }

    #[test]
    fn plan_request_conflicts() {
        let (a, b) = pair();
        let fwd = edge(a, b, ConnectionStatus::Pending, 10);
        assert_eq!(plan_request(a, b, &[fwd]), Err(RequestError::AlreadyPending));

        let acc = edge(b, a, ConnectionStatus::Accepted, 10);
        assert_eq!(plan_request(a, b, &[acc]), Err(RequestError::AlreadyConnected));
    }

    #[test]
    fn plan_request_reopens_declined() {
        let (a, b) = pair();
        let fwd = edge(a, b, ConnectionStatus::Declined, 10);
        assert_eq!(
            plan_request(a, b, std::slice::from_ref(&fwd)),
            Ok(RequestPlan::Reopen(fwd.id))
        );
    }

    #[test]
    fn plan_request_replaces_stale_reverse() {
        let (a, b) = pair();
        let rev = edge(b, a, ConnectionStatus::Declined, 10);
        assert_eq!(
            plan_request(a, b, std::slice::from_ref(&rev)),
            Ok(RequestPlan::Create {
                stale_reverse: Some(rev.id)
            })
        );
    }

    #[test]
    fn relationship_single_edge() {
        let (a, b) = pair();
        let e = edge(a, b, ConnectionStatus::Pending, 0);
        let edges = [e];
        assert_eq!(Relationship::resolve(a, &edges).0, Relationship::PendingSent);
        assert_eq!(Relationship::resolve(b, &edges).0, Relationship::PendingReceived);
    }

    #[test]
    fn relationship_none_without_edges() {
        let (a, _) = pair();
        let (rel, winner) = Relationship::resolve(a, &[]);
        assert_eq!(rel, Relationship::None);
        assert!(winner.is_none());
    }

    #[test]
    fn relationship_prefers_stronger_edge() {
        let (a, b) = pair();
        let declined = edge(a, b, ConnectionStatus::Declined, 20);
        let pending = edge(b, a, ConnectionStatus::Pending, 10);
        let edges = [declined, pending.clone()];

        let (rel, winner) = Relationship::resolve(a, &edges);
        assert_eq!(rel, Relationship::PendingReceived);
        assert_eq!(winner.map(|e| e.id), Some(pending.id));

        let accepted = edge(a, b, ConnectionStatus::Accepted, 5);
        let edges = [pending, accepted];
        assert_eq!(Relationship::resolve(a, &edges).0, Relationship::Connected);
    }

    #[test]
    fn relationship_ignores_unrelated_edges() {
        let (a, b) = pair();
        let c = Uuid::new_v4();
        let edges = [edge(b, c, ConnectionStatus::Accepted, 0)];
        assert_eq!(Relationship::resolve(a, &edges).0, Relationship::None);
    }

    #[test]
    fn repair_single_edge_is_noop() {
        let (a, b) = pair();
        let e = edge(a, b, ConnectionStatus::Pending, 0);
        let plan = plan_pair_repair(std::slice::from_ref(&e));
        assert!(plan.is_noop());
        assert_eq!(plan.keep, Some(e.id));
    }

    #[test]
    fn repair_keeps_accepted() {
        let (a, b) = pair();
        let pending = edge(a, b, ConnectionStatus::Pending, 5);
        let accepted = edge(b, a, ConnectionStatus::Accepted, 1);
        let plan = plan_pair_repair(&[pending.clone(), accepted.clone()]);
        assert_eq!(plan.keep, Some(accepted.id));
        assert_eq!(plan.set_status, None);
        assert_eq!(plan.delete, vec![pending.id]);
    }

    #[test]
    fn repair_mutual_pending_becomes_accepted() {
        let (a, b) = pair();
        let older = edge(a, b, ConnectionStatus::Pending, 50);
        let newer = edge(b, a, ConnectionStatus::Pending, 5);
        let plan = plan_pair_repair(&[newer.clone(), older.clone()]);
        assert_eq!(plan.keep, Some(older.id));
        assert_eq!(plan.set_status, Some(ConnectionStatus::Accepted));
        assert_eq!(plan.delete, vec![newer.id]);
    }

    #[test]
    fn repair_pending_beats_declined() {
        let (a, b) = pair();
        let declined = edge(a, b, ConnectionStatus::Declined, 1);
        let pending = edge(b, a, ConnectionStatus::Pending, 50);
        let plan = plan_pair_repair(&[declined.clone(), pending.clone()]);
        assert_eq!(plan.keep, Some(pending.id));
        assert_eq!(plan.delete, vec![declined.id]);
    }

    #[test]
    fn repair_two_declined_keeps_newer() {
        let (a, b) = pair();
        let older = edge(a, b, ConnectionStatus::Declined, 50);
        let newer = edge(b, a, ConnectionStatus::Declined, 1);
        let plan = plan_pair_repair(&[older.clone(), newer.clone()]);
        assert_eq!(plan.keep, Some(newer.id));
        assert_eq!(plan.delete, vec![older.id]);
    }
}
