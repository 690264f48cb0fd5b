//! Peer connection negotiator.
//!
//! Owns one peer transport per call and drives the three-message
//! offer/answer/candidate exchange over a relay channel. The initiator is
//! chosen deterministically from the two participant ids, so both sides
//! agree without coordination.
//!
//! The negotiator reports upward through [`NegotiatorEvent`]s and never
//! mutates session state. Malformed or misdirected signals are logged and
//! dropped; only failures that prevent call setup (device denial, relay
//! unreachable) surface as errors from [`Negotiator::start`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duet_shared::protocol::{SignalMessage, SignalPayload};
use duet_shared::types::{CallId, CallKind, UserId};
use duet_signal::{RelayError, SignalRelay, SubscriptionId};

use crate::devices::{DeviceError, LocalTracks, MediaConstraints, MediaProvider};
use crate::transport::{PeerTransport, TransportError, TransportState};

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Negotiator already has an active call")]
    AlreadyActive,

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    OfferReceived,
    Connected,
    Closed,
}

/// Events reported to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatorEvent {
    /// Local media acquired and signaling underway.
    LocalReady { call_id: CallId },
    /// Both descriptions applied; the transport is up.
    Connected { call_id: CallId },
    /// The call is over: explicit end, peer hangup, or the transport hit
    /// a terminal state. Emitted exactly once per call.
    Ended { call_id: CallId },
}

/// Deterministic initiator choice: the smaller participant id initiates.
pub fn initiator_of(a: UserId, b: UserId) -> UserId {
    if a <= b {
        a
    } else {
        b
    }
}

pub struct Negotiator {
    self_id: UserId,
    relay: Arc<dyn SignalRelay>,
    provider: Arc<dyn MediaProvider>,
    events: mpsc::UnboundedSender<NegotiatorEvent>,

    // Per-call fields, cleared by teardown.
    transport: Option<Box<dyn PeerTransport>>,
    peer: Option<UserId>,
    call_id: Option<CallId>,
    kind: Option<CallKind>,
    subscription: Option<(String, SubscriptionId)>,
    tracks: Option<LocalTracks>,

    state: NegotiationState,
    ended_notified: bool,
    connected_notified: bool,
}

impl Negotiator {
    pub fn new(
        self_id: UserId,
        relay: Arc<dyn SignalRelay>,
        provider: Arc<dyn MediaProvider>,
        events: mpsc::UnboundedSender<NegotiatorEvent>,
    ) -> Self {
        Self {
            self_id,
            relay,
            provider,
            events,
            transport: None,
            peer: None,
            call_id: None,
            kind: None,
            subscription: None,
            tracks: None,
            state: NegotiationState::Idle,
            ended_notified: false,
            connected_notified: false,
        }
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.call_id.is_some()
    }

    pub fn is_initiator(&self) -> Option<bool> {
        self.peer
            .map(|peer| initiator_of(self.self_id, peer) == self.self_id)
    }

    /// Begin a call: acquire local media, subscribe to the call's relay
    /// channel, and (as initiator) create and send the offer.
    ///
    /// Returns the receiver for inbound relay traffic; the caller feeds
    /// each message back into [`Negotiator::handle_signal`].
    pub fn start(
        &mut self,
        peer: UserId,
        call_id: CallId,
        kind: CallKind,
        transport: Box<dyn PeerTransport>,
    ) -> Result<mpsc::UnboundedReceiver<SignalMessage>, NegotiationError> {
        if self.is_active() {
            return Err(NegotiationError::AlreadyActive);
        }

        // Device denial aborts the attempt before anything is registered.
        let tracks = self.provider.acquire(MediaConstraints::for_kind(kind))?;

        let topic = call_id.to_topic();
        let (sub_id, rx) = self.relay.subscribe(&topic);

        self.transport = Some(transport);
        self.peer = Some(peer);
        self.call_id = Some(call_id);
        self.kind = Some(kind);
        self.subscription = Some((topic, sub_id));
        self.tracks = Some(tracks);
        self.state = NegotiationState::Idle;
        self.ended_notified = false;
        self.connected_notified = false;

        let initiating = initiator_of(self.self_id, peer) == self.self_id;
        info!(
            peer = %peer.short(),
            call = %call_id,
            kind = %kind,
            initiating,
            "negotiation started"
        );

        if initiating {
            if let Err(e) = self.send_offer() {
                // Unwind the half-registered call without an Ended event;
                // the caller sees the error directly.
                self.ended_notified = true;
                self.teardown(false);
                return Err(e);
            }
        }

        self.emit(NegotiatorEvent::LocalReady { call_id });
        Ok(rx)
    }

    fn send_offer(&mut self) -> Result<(), NegotiationError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        let offer = transport.create_offer()?;
        self.send_signal(SignalPayload::Offer(offer))?;
        self.state = NegotiationState::OfferSent;
        self.flush_candidates();
        Ok(())
    }

    /// Process one inbound signaling message.
    ///
    /// Messages not addressed to this participant, or for a different
    /// call, are ignored: the relay channel may be shared/broadcast.
    /// Local errors (malformed SDP or candidate) are absorbed and logged;
    /// the session continues.
    pub fn handle_signal(&mut self, msg: &SignalMessage) {
        if msg.target != self.self_id {
            debug!(
                target = %msg.target.short(),
                kind = msg.payload.kind(),
                "ignoring signal addressed to another participant"
            );
            return;
        }
        let Some(call_id) = self.call_id else {
            debug!(kind = msg.payload.kind(), "ignoring signal, no active call");
            return;
        };
        if msg.call_id != call_id {
            debug!(
                got = %msg.call_id,
                expected = %call_id,
                "ignoring signal for another call"
            );
            return;
        }

        match &msg.payload {
            SignalPayload::Offer(desc) => {
                debug!(from = %msg.sender.short(), "received SDP offer");
                self.state = NegotiationState::OfferReceived;
                let answer = {
                    let Some(transport) = self.transport.as_mut() else {
                        return;
                    };
                    match transport
                        .set_remote_description(desc.clone())
                        .and_then(|_| transport.create_answer())
                    {
                        Ok(answer) => answer,
                        Err(e) => {
                            warn!(error = %e, "dropping unusable offer");
                            return;
                        }
                    }
                };
                if let Err(e) = self.send_signal(SignalPayload::Answer(answer)) {
                    warn!(error = %e, "failed to send answer");
                }
                self.flush_candidates();
                self.observe_transport();
            }
            SignalPayload::Answer(desc) => {
                debug!(from = %msg.sender.short(), "received SDP answer");
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.set_remote_description(desc.clone()) {
                        warn!(error = %e, "dropping unusable answer");
                        return;
                    }
                }
                self.observe_transport();
            }
            SignalPayload::Candidate(candidate) => {
                if let Some(transport) = self.transport.as_mut() {
                    // Unknown/stale candidates are a local, non-fatal error.
                    if let Err(e) = transport.add_ice_candidate(candidate.clone()) {
                        warn!(error = %e, "dropping ICE candidate");
                    }
                }
                self.observe_transport();
            }
            SignalPayload::Hangup => {
                debug!(from = %msg.sender.short(), "received hangup");
                self.teardown(false);
            }
        }
    }

    /// Periodic poll: relay newly discovered candidates and watch for the
    /// transport entering a terminal state. Safe to call in any state.
    ///
    /// Relay delivery is best-effort, so an offer sent before the peer
    /// subscribed may be lost; the initiator keeps re-offering until an
    /// answer arrives.
    pub fn check_transport(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.state == NegotiationState::OfferSent && !self.connected_notified {
            if let Err(e) = self.send_offer() {
                warn!(error = %e, "failed to re-send offer");
            }
        }
        self.flush_candidates();
        self.observe_transport();
    }

    /// Mute or unmute the local microphone. Reversible; observable only
    /// by the embedding UI.
    pub fn set_muted(&mut self, muted: bool) {
        if let Some(tracks) = &self.tracks {
            tracks.set_audio_enabled(!muted);
        }
    }

    /// End the call: stop local tracks, close the transport, tell the
    /// peer, and unsubscribe from the relay.
    ///
    /// Idempotent -- calling it again, or on a negotiator that never
    /// started, is a no-op and emits no duplicate event.
    pub fn end(&mut self) {
        self.teardown(true);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn teardown(&mut self, send_hangup: bool) {
        if !self.is_active() {
            return;
        }

        if send_hangup {
            if let Err(e) = self.send_signal(SignalPayload::Hangup) {
                debug!(error = %e, "hangup not delivered");
            }
        }

        if let Some(tracks) = self.tracks.take() {
            tracks.stop_all();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some((topic, sub_id)) = self.subscription.take() {
            self.relay.unsubscribe(&topic, sub_id);
        }

        self.notify_ended();

        let call_id = self.call_id.take();
        self.peer = None;
        self.kind = None;
        self.state = NegotiationState::Closed;

        if let Some(call_id) = call_id {
            info!(call = %call_id, "negotiation torn down");
        }
    }

    fn send_signal(&self, payload: SignalPayload) -> Result<(), RelayError> {
        let (Some(peer), Some(call_id), Some((topic, _))) =
            (self.peer, self.call_id, self.subscription.as_ref())
        else {
            return Ok(());
        };

        self.relay.send(
            topic,
            SignalMessage {
                sender: self.self_id,
                target: peer,
                call_id,
                payload,
            },
        )
    }

    fn flush_candidates(&mut self) {
        let candidates = match self.transport.as_mut() {
            Some(transport) => transport.take_local_candidates(),
            None => return,
        };
        for candidate in candidates {
            if let Err(e) = self.send_signal(SignalPayload::Candidate(candidate)) {
                warn!(error = %e, "failed to relay ICE candidate");
            }
        }
    }

    /// React to the transport's connectivity state: announce `Connected`
    /// once, and treat terminal states as an implicit call end (debounced
    /// to a single notification).
    fn observe_transport(&mut self) {
        let Some(state) = self.transport.as_ref().map(|t| t.state()) else {
            return;
        };

        if state == TransportState::Connected && !self.connected_notified {
            self.connected_notified = true;
            self.state = NegotiationState::Connected;
            if let Some(call_id) = self.call_id {
                info!(call = %call_id, "peer transport connected");
                self.emit(NegotiatorEvent::Connected { call_id });
            }
        }

        if state.is_terminal() {
            self.teardown(false);
        }
    }

    fn notify_ended(&mut self) {
        if self.ended_notified {
            return;
        }
        if let Some(call_id) = self.call_id {
            self.ended_notified = true;
            self.emit(NegotiatorEvent::Ended { call_id });
        }
    }

    fn emit(&self, event: NegotiatorEvent) {
        if self.events.send(event).is_err() {
            debug!("negotiator event receiver dropped");
        }
    }
}
