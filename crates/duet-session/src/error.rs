use thiserror::Error;

use duet_media::NegotiationError;
use duet_store::StoreError;

use crate::state::Stage;

/// Errors surfaced by the session layer.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation was invoked in a stage where it is not valid. Never
    /// silently swallowed; the caller's state is left untouched.
    #[error("Operation '{operation}' is not valid in stage {stage:?}")]
    InvalidState {
        operation: &'static str,
        stage: Stage,
    },

    /// Persistence failure. Surfaced as-is; the engine never retries on
    /// its own.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Call setup failure (device denial, relay unreachable, transport).
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),
}
