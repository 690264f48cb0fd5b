//! Events emitted by the session core for the embedding UI layer.

use serde::Serialize;
use uuid::Uuid;

use duet_shared::types::{CallId, MatchId, UserId};

use crate::state::Stage;

/// Broad error category attached to [`SessionEvent::Error`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Store,
    Device,
    Signaling,
    InvalidState,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A match became visible to this user.
    MatchFound { match_id: MatchId, peer: UserId },
    /// The current match was declined (by this side, or closed after an
    /// end decision).
    MatchRejected { match_id: MatchId },
    /// The stage changed or an active countdown ticked.
    CallStageChanged { stage: Stage, remaining: u32 },
    /// The current call ended. Emitted exactly once per call.
    CallEnded { call_id: CallId },
    /// An abuse report was persisted.
    ReportSubmitted { report_id: Uuid },
    /// A fatal or surfaced error; the session has already moved to a
    /// safe stage by the time this is observed.
    Error { kind: ErrorKind, message: String },
}
