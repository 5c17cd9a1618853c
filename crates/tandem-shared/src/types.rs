//! Domain models shared between the relay server and the store.
//!
//! Identities are opaque integer ids owned by the account collaborator;
//! everything here derives `Serialize`/`Deserialize` so records can be
//! handed straight to the wire protocol or the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// User identity = opaque integer id assigned by the account service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl UserId {
    /// A well-formed identity is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Account data mirrored from the user collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    /// Deactivated accounts are excluded from presence and cannot authenticate.
    pub active: bool,
}

impl UserProfile {
    /// The subset of profile data attached to outgoing events.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            display_name: self.display_name.clone(),
        }
    }
}

/// Sender metadata carried on decorated events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Connection record (social-graph edge, distinct from a live connection)
// ---------------------------------------------------------------------------

/// Lifecycle status of a connection request between two identities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConnectionStatus::Pending),
            "accepted" => Some(ConnectionStatus::Accepted),
            "rejected" => Some(ConnectionStatus::Rejected),
            _ => None,
        }
    }
}

/// A persisted connection request/edge between two identities.
///
/// Invariant: at most one record exists per unordered pair, regardless of
/// which side is currently recorded as the requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: i64,
    pub requester_id: UserId,
    pub receiver_id: UserId,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// The party on the other side of this record from `user`.
    pub fn counterparty_of(&self, user: UserId) -> UserId {
        if self.requester_id == user {
            self.receiver_id
        } else {
            self.requester_id
        }
    }
}

// ---------------------------------------------------------------------------
// Mentor match (structural relationship that also confers messaging rights)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Approved,
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Approved => "approved",
            MatchStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MatchStatus::Pending),
            "approved" => Some(MatchStatus::Approved),
            "ended" => Some(MatchStatus::Ended),
            _ => None,
        }
    }
}

/// Which side of a mentorship pairing an identity occupies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchRole {
    Mentor,
    Mentee,
}

/// A mentor/mentee pairing owned by the matching collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MentorMatch {
    pub id: i64,
    pub mentor_id: UserId,
    pub mentee_id: UserId,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// Collaborator-facing projection of a match: who is on the other end, and
/// in what state the pairing is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEdge {
    pub counterparty_id: UserId,
    pub status: MatchStatus,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single persisted chat message.
///
/// Append-only except for the `read` flag, which only moves false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned id; assigned in submission order per store.
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_validity() {
        assert!(UserId(1).is_valid());
        assert!(!UserId(0).is_valid());
        assert!(!UserId(-3).is_valid());
    }

    #[test]
    fn connection_status_round_trip() {
        for status in [
            ConnectionStatus::Pending,
            ConnectionStatus::Accepted,
            ConnectionStatus::Rejected,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConnectionStatus::parse("bogus"), None);
    }

    #[test]
    fn counterparty_resolution() {
        let record = ConnectionRecord {
            id: 1,
            requester_id: UserId(7),
            receiver_id: UserId(9),
            status: ConnectionStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.counterparty_of(UserId(7)), UserId(9));
        assert_eq!(record.counterparty_of(UserId(9)), UserId(7));
    }
}
