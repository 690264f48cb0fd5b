use serde::{Deserialize, Serialize};

use crate::types::{CallId, UserId};

/// A session description produced by one side of the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    /// Raw SDP blob, opaque to everything but the peer transport.
    pub sdp: String,
}

/// One discovered network path, relayed as-is to the peer.
///
/// Candidates carry no ordering guarantee; receivers apply them in
/// whatever order they arrive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u32>,
}

/// Signaling message for establishing a peer media transport.
///
/// Every message is stamped with sender, target, and call id. The relay
/// channel may be shared/broadcast, so receivers must filter on `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub sender: UserId,
    pub target: UserId,
    pub call_id: CallId,
    pub payload: SignalPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalPayload {
    /// SDP offer from the initiator.
    Offer(SessionDescription),
    /// SDP answer from the responder.
    Answer(SessionDescription),
    /// ICE candidate, sent by either side at any time after start.
    Candidate(IceCandidate),
    /// Explicit call teardown.
    Hangup,
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
            Self::Hangup => "hangup",
        }
    }
}

impl SignalMessage {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_message_roundtrip() {
        let msg = SignalMessage {
            sender: UserId::new(),
            target: UserId::new(),
            call_id: CallId::new(),
            payload: SignalPayload::Candidate(IceCandidate {
                candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            }),
        };

        let bytes = msg.to_bytes().unwrap();
        let restored = SignalMessage::from_bytes(&bytes).unwrap();

        assert_eq!(restored.sender, msg.sender);
        assert_eq!(restored.target, msg.target);
        assert_eq!(restored.call_id, msg.call_id);
        assert_eq!(restored.payload.kind(), "candidate");
    }
}
