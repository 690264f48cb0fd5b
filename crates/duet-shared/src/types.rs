use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = UUID handed out by the directory at signup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for a given call stage of a match.
    ///
    /// Both participants derive the same id without coordination, the
    /// same way the initiator is chosen, so they subscribe to the same
    /// relay channel.
    pub fn for_stage(match_id: MatchId, kind: CallKind) -> Self {
        Self(Uuid::new_v5(&match_id.0, kind.as_str().as_bytes()))
    }

    /// Relay channel key for this call's signaling traffic.
    pub fn to_topic(&self) -> String {
        format!("call:{}", self.0)
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MatchId(pub Uuid);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical unordered pair of users.
///
/// `lo` always sorts before `hi`, so `{A, B}` and `{B, A}` produce the
/// same key. The uniqueness constraint on matches is declared over this
/// canonical form, which removes any ambiguity about insertion order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub lo: UserId,
    pub hi: UserId,
}

impl PairKey {
    /// Build the canonical key for an unordered pair.
    ///
    /// Returns `None` when both ids are the same user; a user cannot be
    /// paired with themselves.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { lo: a, hi: b }),
            std::cmp::Ordering::Greater => Some(Self { lo: b, hi: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.lo == user || self.hi == user
    }

    /// The other participant of the pair.
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        if user == self.lo {
            Some(self.hi)
        } else if user == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }
}

/// Voice or video. A match escalates voice -> video, never the reverse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Voice,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "voice" => Some(Self::Voice),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();

        let ab = PairKey::new(a, b).unwrap();
        let ba = PairKey::new(b, a).unwrap();

        assert_eq!(ab, ba);
        assert!(ab.lo < ab.hi);
    }

    #[test]
    fn pair_key_rejects_self_pair() {
        let a = UserId::new();
        assert!(PairKey::new(a, a).is_none());
    }

    #[test]
    fn stage_call_ids_agree_across_participants_and_differ_across_stages() {
        let m = MatchId::new();

        assert_eq!(
            CallId::for_stage(m, CallKind::Voice),
            CallId::for_stage(m, CallKind::Voice)
        );
        assert_ne!(
            CallId::for_stage(m, CallKind::Voice),
            CallId::for_stage(m, CallKind::Video)
        );
        assert_ne!(
            CallId::for_stage(m, CallKind::Voice),
            CallId::for_stage(MatchId::new(), CallKind::Voice)
        );
    }

    #[test]
    fn peer_of_returns_the_other_side() {
        let a = UserId::new();
        let b = UserId::new();
        let key = PairKey::new(a, b).unwrap();

        assert_eq!(key.peer_of(a), Some(b));
        assert_eq!(key.peer_of(b), Some(a));
        assert_eq!(key.peer_of(UserId::new()), None);
    }
}
