//! Timing budgets for the call session lifecycle.

/// Device-setup grace period between match acceptance and the voice call.
pub const PREPARE_GRACE_SECS: u32 = 5;

/// Fixed budget for the first (voice) call.
pub const VOICE_CALL_SECS: u32 = 3 * 60;

/// Fixed budget for the escalated video call. Always at least the voice
/// budget.
pub const VIDEO_CALL_SECS: u32 = 5 * 60;
