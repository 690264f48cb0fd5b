//! # duet-session
//!
//! The call session core: the Match/Like engine that materializes mutual
//! interest exactly once per pair, and the session controller that drives
//! the match -> prepare -> voice -> video -> decision lifecycle.
//!
//! The controller is a synchronous state machine owning its
//! [`SessionState`]; nothing else writes to it. External layers consume
//! [`SessionEvent`]s instead of reading shared state. [`task::spawn_session`]
//! wraps controller, engine, and negotiator in a tokio task driven by a
//! command channel and a 1-second tick.
//!
//! [`SessionState`]: state::SessionState
//! [`SessionEvent`]: events::SessionEvent

pub mod config;
pub mod controller;
pub mod engine;
pub mod events;
pub mod state;
pub mod task;

mod error;

pub use config::SessionConfig;
pub use controller::{Decision, Effect, SessionController};
pub use engine::{LikeOutcome, MatchEngine, RelationshipEvent};
pub use error::SessionError;
pub use events::{ErrorKind, SessionEvent};
pub use state::{SessionState, Stage};
pub use task::{spawn_session, SessionCommand, SharedDb};
