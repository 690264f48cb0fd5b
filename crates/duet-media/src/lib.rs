//! # duet-media
//!
//! Local media acquisition and the peer connection negotiator.
//!
//! [`devices`] owns the microphone/camera seam: a [`MediaProvider`] trait
//! with a cpal-backed implementation for real audio capture and a static
//! one for tests. [`transport`] is the seam over the actual peer media
//! stack. [`negotiator`] drives the offer/answer/ICE exchange across a
//! relay channel and reports upward through events; it never touches
//! session state directly.
//!
//! [`MediaProvider`]: devices::MediaProvider

pub mod devices;
pub mod negotiator;
pub mod transport;

pub use devices::{DeviceError, LocalTracks, MediaConstraints, MediaProvider, StaticProvider};
pub use negotiator::{NegotiationError, NegotiationState, Negotiator, NegotiatorEvent};
pub use transport::{LoopTransport, PeerTransport, TransportError, TransportState};
