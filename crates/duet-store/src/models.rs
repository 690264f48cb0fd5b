//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to an embedding UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duet_shared::types::{CallId, CallKind, MatchId, PairKey, UserId};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    /// Lenient parse used at the Directory boundary: unknown values fall
    /// back to `Other` instead of failing the whole row.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "male" => Self::Male,
            "female" => Self::Female,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreferredGender {
    Male,
    Female,
    Both,
    All,
}

impl PreferredGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Both => "both",
            Self::All => "all",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "male" => Self::Male,
            "female" => Self::Female,
            "both" => Self::Both,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipGoal {
    Serious,
    Casual,
    Friendship,
}

impl RelationshipGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serious => "serious",
            Self::Casual => "casual",
            Self::Friendship => "friendship",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "serious" => Self::Serious,
            "friendship" => Self::Friendship,
            _ => Self::Casual,
        }
    }
}

/// A user profile as seen through the Directory.
///
/// Consumed read-only by the matching core; the identity key is immutable
/// and used throughout as the participant address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub preferred_gender: PreferredGender,
    pub location: String,
    pub bio: Option<String>,
    /// Opaque reference to a profile picture (URL or blob hash).
    pub avatar: Option<String>,
    pub relationship_goal: RelationshipGoal,
    pub premium: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields of a profile that may be updated after creation.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub relationship_goal: Option<RelationshipGoal>,
}

// ---------------------------------------------------------------------------
// Like
// ---------------------------------------------------------------------------

/// One-directional expressed interest. Never mutated; deleted only by an
/// explicit unlike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub liker: UserId,
    pub liked: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Mutual like detected, awaiting both parties' call-accept.
    Pending,
    /// Both sides accepted; a call may run.
    Accepted,
    /// Session resolved positively (contact exchange).
    Completed,
    /// Either side declined or ended the match.
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Materialized mutual interest between two users.
///
/// At most one Match exists per unordered pair; the pair is stored in
/// canonical `lo < hi` order and guarded by a UNIQUE constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub pair: PairKey,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Active,
    Completed,
    Rejected,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A timed voice or video session scoped to one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Call {
    pub id: CallId,
    pub match_id: MatchId,
    pub kind: CallKind,
    pub status: CallStatus,
    /// Fixed duration budget in seconds.
    pub duration_secs: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "reviewed" => Some(Self::Reviewed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Append-only abuse report. Never mutated by this core after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub id: Uuid,
    pub reporter: UserId,
    pub reported: UserId,
    pub call_id: Option<CallId>,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}
