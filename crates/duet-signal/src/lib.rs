//! # duet-signal
//!
//! The signaling relay seam: a typed subscribe/send/unsubscribe surface
//! over broadcast channels keyed by call id. The relay carries only
//! [`SignalMessage`]s, never media.
//!
//! [`MemoryRelay`] is the in-process implementation used by tests and the
//! demo; a networked deployment substitutes its own [`SignalRelay`].
//!
//! [`SignalMessage`]: duet_shared::protocol::SignalMessage

pub mod relay;

pub use relay::{MemoryRelay, RelayError, SignalRelay, SubscriptionId};
