//! Session timing configuration.

use serde::{Deserialize, Serialize};

use duet_shared::constants::{PREPARE_GRACE_SECS, VIDEO_CALL_SECS, VOICE_CALL_SECS};

/// Countdown budgets for one session. Tests shrink these to keep tick
/// loops short; production uses the defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device-setup grace period between accept and the voice call.
    pub prepare_grace_secs: u32,
    /// Voice call budget.
    pub voice_secs: u32,
    /// Video call budget. Expected to be >= the voice budget.
    pub video_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prepare_grace_secs: PREPARE_GRACE_SECS,
            voice_secs: VOICE_CALL_SECS,
            video_secs: VIDEO_CALL_SECS,
        }
    }
}

impl SessionConfig {
    pub fn budget_for(&self, kind: duet_shared::types::CallKind) -> u32 {
        match kind {
            duet_shared::types::CallKind::Voice => self.voice_secs,
            duet_shared::types::CallKind::Video => self.video_secs,
        }
    }
}
