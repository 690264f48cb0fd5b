//! Process-local session state.
//!
//! One [`SessionState`] exists per logged-in user and is mutated only by
//! that user's [`SessionController`]; external layers subscribe to
//! [`SessionEvent`]s instead of reading this struct directly.
//!
//! [`SessionController`]: crate::controller::SessionController
//! [`SessionEvent`]: crate::events::SessionEvent

use serde::{Deserialize, Serialize};

use duet_shared::types::UserId;
use duet_store::{Call, Match};

/// The controller's current state-machine value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Logged in, not looking.
    Idle,
    /// Opted in to discovery.
    Searching,
    /// A match is visible; awaiting accept/reject.
    MatchPending,
    /// Both sides accepted; device-setup grace countdown running.
    Preparing,
    /// Timed voice call in progress.
    VoiceActive,
    /// Timed video call in progress.
    VideoActive,
    /// Call budget exhausted or call ended; awaiting continue/end.
    Decision,
}

impl Stage {
    /// Stages with a live call countdown.
    pub fn is_call_active(&self) -> bool {
        matches!(self, Self::VoiceActive | Self::VideoActive)
    }

    /// Stages in which a match (and possibly a call) is in flight.
    pub fn has_match(&self) -> bool {
        !matches!(self, Self::Idle | Self::Searching)
    }
}

/// Everything the session knows about the current user's activity.
/// Created at login; reset wholesale at logout or match resolution.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: UserId,
    pub stage: Stage,
    pub is_searching: bool,
    pub current_match: Option<Match>,
    pub current_call: Option<Call>,
    /// Seconds left on the current countdown (grace period or call).
    pub time_remaining: u32,
}

impl SessionState {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            stage: Stage::Idle,
            is_searching: false,
            current_match: None,
            current_call: None,
            time_remaining: 0,
        }
    }

    /// The other participant of the current match, if any.
    pub fn peer(&self) -> Option<UserId> {
        self.current_match
            .as_ref()
            .and_then(|m| m.pair.peer_of(self.user))
    }

    /// Drop match, call, and countdown; keep the user.
    pub fn clear_activity(&mut self) {
        self.current_match = None;
        self.current_call = None;
        self.time_remaining = 0;
    }
}
