//! The peer transport seam.
//!
//! [`PeerTransport`] is what the negotiator drives: SDP exchange, ICE
//! candidate application, and connectivity state. [`LoopTransport`] is a
//! deterministic in-memory implementation used by tests and the demo; a
//! production build plugs a real WebRTC stack in behind the same trait.

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use duet_shared::protocol::{IceCandidate, SessionDescription};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("Bad ICE candidate: {0}")]
    Candidate(String),

    #[error("Transport is closed")]
    Closed,
}

/// Connectivity state, mirroring the usual peer-connection state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// Terminal states imply the call is over; the negotiator reports
    /// them upward exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// One bidirectional media transport between two peers.
pub trait PeerTransport: Send {
    /// Create the local offer and set it as the local description.
    fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    /// Create the local answer (requires a remote offer) and set it as
    /// the local description.
    fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    /// Apply the peer's description.
    fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), TransportError>;

    /// Apply one ICE candidate from the peer. Candidates may arrive in
    /// any order; stale or malformed ones fail locally without killing
    /// the transport.
    fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Drain locally discovered candidates since the last call. The
    /// negotiator relays each one to the peer.
    fn take_local_candidates(&mut self) -> Vec<IceCandidate>;

    fn state(&self) -> TransportState;

    /// Close the transport. Idempotent.
    fn close(&mut self);
}

/// Deterministic in-memory transport.
///
/// Generates a synthetic SDP per side and one host candidate; reaches
/// `Connected` once both descriptions are set. No packets leave the
/// process.
pub struct LoopTransport {
    id: Uuid,
    local_sdp: Option<SessionDescription>,
    remote_sdp: Option<SessionDescription>,
    pending_candidates: Vec<IceCandidate>,
    remote_candidates: Vec<IceCandidate>,
    state: TransportState,
}

impl LoopTransport {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            local_sdp: None,
            remote_sdp: None,
            pending_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            state: TransportState::New,
        }
    }

    /// Candidates applied from the peer so far (test helper).
    pub fn remote_candidates(&self) -> &[IceCandidate] {
        &self.remote_candidates
    }

    /// Force a connectivity outcome, for exercising failure paths.
    pub fn force_state(&mut self, state: TransportState) {
        self.state = state;
    }

    fn synth_description(&self, role: &str) -> SessionDescription {
        SessionDescription {
            sdp: format!("v=0\r\no=duet {} 0 IN IP4 127.0.0.1\r\ns={role}\r\n", self.id),
        }
    }

    fn discover_host_candidate(&mut self) {
        self.pending_candidates.push(IceCandidate {
            candidate: format!("candidate:{} 1 UDP 2122252543 127.0.0.1 40000 typ host", self.id),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        });
    }

    fn maybe_connect(&mut self) {
        if self.local_sdp.is_some() && self.remote_sdp.is_some() {
            self.state = TransportState::Connected;
            debug!(transport = %self.id, "transport connected");
        }
    }
}

impl Default for LoopTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTransport for LoopTransport {
    fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        if self.state == TransportState::Closed {
            return Err(TransportError::Closed);
        }
        let desc = self.synth_description("offer");
        self.local_sdp = Some(desc.clone());
        self.state = TransportState::Connecting;
        self.discover_host_candidate();
        Ok(desc)
    }

    fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        if self.state == TransportState::Closed {
            return Err(TransportError::Closed);
        }
        if self.remote_sdp.is_none() {
            return Err(TransportError::Sdp("answer without a remote offer".into()));
        }
        let desc = self.synth_description("answer");
        self.local_sdp = Some(desc.clone());
        self.discover_host_candidate();
        self.maybe_connect();
        Ok(desc)
    }

    fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), TransportError> {
        if self.state == TransportState::Closed {
            return Err(TransportError::Closed);
        }
        if desc.sdp.is_empty() {
            return Err(TransportError::Sdp("empty SDP".into()));
        }
        self.remote_sdp = Some(desc);
        self.maybe_connect();
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        if self.state == TransportState::Closed {
            return Err(TransportError::Closed);
        }
        if candidate.candidate.is_empty() {
            return Err(TransportError::Candidate("empty candidate line".into()));
        }
        // Duplicates are tolerated; re-application is a no-op.
        if !self.remote_candidates.contains(&candidate) {
            self.remote_candidates.push(candidate);
        }
        Ok(())
    }

    fn take_local_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn close(&mut self) {
        self.state = TransportState::Closed;
        self.pending_candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_answer_connects_both_sides() {
        let mut caller = LoopTransport::new();
        let mut callee = LoopTransport::new();

        let offer = caller.create_offer().unwrap();
        callee.set_remote_description(offer).unwrap();
        let answer = callee.create_answer().unwrap();
        caller.set_remote_description(answer).unwrap();

        assert_eq!(caller.state(), TransportState::Connected);
        assert_eq!(callee.state(), TransportState::Connected);
    }

    #[test]
    fn answer_before_offer_is_rejected() {
        let mut t = LoopTransport::new();
        assert!(matches!(
            t.create_answer(),
            Err(TransportError::Sdp(_))
        ));
    }

    #[test]
    fn candidates_tolerate_duplicates_and_any_order() {
        let mut t = LoopTransport::new();
        let cand = IceCandidate {
            candidate: "candidate:1 1 UDP 1 127.0.0.1 1 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };

        // Applied before any description exchange.
        t.add_ice_candidate(cand.clone()).unwrap();
        t.add_ice_candidate(cand).unwrap();
        assert_eq!(t.remote_candidates().len(), 1);
    }

    #[test]
    fn closed_transport_rejects_everything() {
        let mut t = LoopTransport::new();
        t.close();
        t.close(); // idempotent

        assert!(matches!(t.create_offer(), Err(TransportError::Closed)));
        assert!(t.state().is_terminal());
    }
}
