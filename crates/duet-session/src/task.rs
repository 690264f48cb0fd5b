//! Async session driver.
//!
//! [`spawn_session`] wires one user's controller, negotiator, and engine
//! subscription into a single tokio task. The task is the sole owner of
//! the controller; everything external talks to it over the command
//! channel and listens on the event channel. A 1-second interval is the
//! only tick source for countdowns and transport polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use duet_media::{
    MediaProvider, NegotiationError, Negotiator, NegotiatorEvent, PeerTransport,
};
use duet_shared::protocol::SignalMessage;
use duet_shared::types::UserId;
use duet_signal::SignalRelay;

use crate::config::SessionConfig;
use crate::controller::{Decision, Effect, SessionController};
use crate::engine::{LikeOutcome, MatchEngine, RelationshipEvent};
use crate::error::SessionError;
use crate::events::{ErrorKind, SessionEvent};

pub use crate::engine::SharedDb;

/// Commands accepted by a running session task.
#[derive(Debug)]
pub enum SessionCommand {
    StartSearching,
    StopSearching,
    AcceptMatch,
    RejectMatch,
    EndCall,
    MakeDecision(Decision),
    Like(UserId),
    Unlike(UserId),
    Report { user: UserId, reason: String },
    SetMuted(bool),
    Shutdown,
}

/// Spawn the session task for `user`.
///
/// `transport_factory` builds one fresh peer transport per call. Returns
/// the command sender and the session event stream; dropping the sender
/// shuts the task down.
pub fn spawn_session<F>(
    user: UserId,
    config: SessionConfig,
    db: SharedDb,
    engine: Arc<MatchEngine>,
    relay: Arc<dyn SignalRelay>,
    provider: Arc<dyn MediaProvider>,
    transport_factory: F,
) -> (
    mpsc::Sender<SessionCommand>,
    mpsc::UnboundedReceiver<SessionEvent>,
)
where
    F: Fn() -> Box<dyn PeerTransport> + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (neg_event_tx, neg_event_rx) = mpsc::unbounded_channel();

    let relationship_rx = engine.subscribe(user);
    let controller = SessionController::new(user, config, db, event_tx);
    let negotiator = Negotiator::new(user, relay, provider, neg_event_tx);

    let driver = Driver {
        user,
        controller,
        negotiator,
        engine,
        transport_factory: Box::new(transport_factory),
        signal_rx: None,
    };

    tokio::spawn(driver.run(cmd_rx, relationship_rx, neg_event_rx));

    (cmd_tx, event_rx)
}

struct Driver {
    user: UserId,
    controller: SessionController,
    negotiator: Negotiator,
    engine: Arc<MatchEngine>,
    transport_factory: Box<dyn Fn() -> Box<dyn PeerTransport> + Send>,
    /// Inbound relay traffic for the current call, if one is negotiating.
    signal_rx: Option<mpsc::UnboundedReceiver<SignalMessage>>,
}

impl Driver {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut relationship_rx: mpsc::UnboundedReceiver<RelationshipEvent>,
        mut neg_event_rx: mpsc::UnboundedReceiver<NegotiatorEvent>,
    ) {
        let mut ticker = time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(user = %self.user.short(), "session task started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(event) = relationship_rx.recv() => {
                    self.handle_relationship(event);
                }
                Some(event) = neg_event_rx.recv() => {
                    self.handle_negotiator_event(event);
                }
                Some(msg) = recv_signal(&mut self.signal_rx) => {
                    self.negotiator.handle_signal(&msg);
                }
                _ = ticker.tick() => {
                    self.negotiator.check_transport();
                    match self.controller.tick() {
                        Ok(effect) => self.apply_effect(effect),
                        Err(e) => self.surface(e),
                    }
                }
            }
        }

        let effect = self.controller.reset();
        self.apply_effect(effect);
        info!(user = %self.user.short(), "session task stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        let result = match cmd {
            SessionCommand::StartSearching => self.controller.start_searching().map(|_| Effect::None),
            SessionCommand::StopSearching => {
                self.controller.stop_searching();
                Ok(Effect::None)
            }
            SessionCommand::AcceptMatch => self.controller.accept_match().map(|_| Effect::None),
            SessionCommand::RejectMatch => self.controller.reject_match().map(|_| Effect::None),
            SessionCommand::EndCall => self.controller.end_call(),
            SessionCommand::MakeDecision(decision) => self.controller.make_decision(decision),
            SessionCommand::Like(target) => self.handle_like(target),
            SessionCommand::Unlike(target) => self
                .engine
                .unlike(self.user, target)
                .map(|_| Effect::None)
                .map_err(SessionError::from),
            SessionCommand::Report { user, reason } => {
                self.controller.report_user(user, &reason)
            }
            SessionCommand::SetMuted(muted) => {
                self.negotiator.set_muted(muted);
                Ok(Effect::None)
            }
            SessionCommand::Shutdown => unreachable!("handled by the select loop"),
        };

        match result {
            Ok(effect) => self.apply_effect(effect),
            Err(e) => self.surface(e),
        }
    }

    fn handle_like(&mut self, target: UserId) -> Result<Effect, SessionError> {
        match self.engine.like(self.user, target)? {
            LikeOutcome::Matched(matched) => {
                // A freshly created match also arrives via the engine
                // subscription; offering twice is harmless because the
                // controller ignores matches while one is pending.
                self.controller.offer_match(matched)?;
            }
            outcome => debug!(?outcome, "like recorded"),
        }
        Ok(Effect::None)
    }

    fn handle_relationship(&mut self, event: RelationshipEvent) {
        match event {
            RelationshipEvent::LikeReceived { from } => {
                // Surfacing incoming likes is a UI concern; the core only
                // acts once mutuality materializes a match.
                debug!(from = %from.short(), "like received");
            }
            RelationshipEvent::MatchCreated { matched, peer } => {
                debug!(peer = %peer.short(), "match notification received");
                if let Err(e) = self.controller.offer_match(matched) {
                    self.surface(e);
                }
            }
        }
    }

    fn handle_negotiator_event(&mut self, event: NegotiatorEvent) {
        match event {
            NegotiatorEvent::LocalReady { call_id } => {
                debug!(call = %call_id, "local media ready");
            }
            NegotiatorEvent::Connected { call_id } => {
                debug!(call = %call_id, "peer connected");
            }
            NegotiatorEvent::Ended { call_id } => {
                // Our own teardown queues this event too, and a new call
                // may have started before it drains. Only an end for the
                // call the controller still tracks may act; a stale one
                // must not tear down the successor call's signaling.
                let current = self.controller.state().current_call.as_ref().map(|c| c.id);
                if current != Some(call_id) {
                    debug!(call = %call_id, "stale negotiation end, ignoring");
                    return;
                }
                debug!(call = %call_id, "negotiation ended");
                self.signal_rx = None;
                match self.controller.end_call() {
                    Ok(effect) => self.apply_effect(effect),
                    Err(e) => self.surface(e),
                }
            }
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::StartNegotiation { call, peer } => {
                let transport = (self.transport_factory)();
                match self.negotiator.start(peer, call.id, call.kind, transport) {
                    Ok(rx) => self.signal_rx = Some(rx),
                    Err(e) => {
                        warn!(error = %e, "call setup failed");
                        let kind = match &e {
                            NegotiationError::Device(_) => ErrorKind::Device,
                            _ => ErrorKind::Signaling,
                        };
                        let next = self.controller.fail_call(kind, e.to_string());
                        self.apply_effect(next);
                    }
                }
            }
            Effect::StopNegotiation => {
                self.negotiator.end();
                self.signal_rx = None;
            }
        }
    }

    /// Report a command failure without crashing the task.
    fn surface(&self, error: SessionError) {
        let kind = match &error {
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
            SessionError::Store(_) => ErrorKind::Store,
            SessionError::Negotiation(NegotiationError::Device(_)) => ErrorKind::Device,
            SessionError::Negotiation(_) => ErrorKind::Signaling,
        };
        warn!(error = %error, "command failed");
        self.controller.emit_error(kind, error.to_string());
    }
}

/// Receive from an optional channel; pends forever while no call is
/// negotiating so the select loop stays simple.
async fn recv_signal(
    rx: &mut Option<mpsc::UnboundedReceiver<SignalMessage>>,
) -> Option<SignalMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::state::Stage;
    use duet_media::{LoopTransport, StaticProvider};
    use duet_shared::types::{CallId, CallKind};
    use duet_signal::MemoryRelay;
    use duet_store::Database;

    fn small_config() -> SessionConfig {
        SessionConfig {
            prepare_grace_secs: 1,
            voice_secs: 2,
            video_secs: 2,
        }
    }

    async fn next_matching(
        rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> SessionEvent {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    }

    /// Two full sessions over a shared in-memory relay reach the voice
    /// call and then the decision stage purely from ticks.
    #[tokio::test(start_paused = true)]
    async fn two_sessions_reach_voice_call_and_decision() {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let engine = Arc::new(MatchEngine::new(db.clone()));
        let relay: Arc<dyn SignalRelay> = Arc::new(MemoryRelay::new());

        let a = UserId::new();
        let b = UserId::new();

        let (cmd_a, mut ev_a) = spawn_session(
            a,
            small_config(),
            db.clone(),
            engine.clone(),
            relay.clone(),
            Arc::new(StaticProvider::new()),
            || Box::new(LoopTransport::new()),
        );
        let (cmd_b, mut ev_b) = spawn_session(
            b,
            small_config(),
            db.clone(),
            engine.clone(),
            relay.clone(),
            Arc::new(StaticProvider::new()),
            || Box::new(LoopTransport::new()),
        );

        cmd_a.send(SessionCommand::StartSearching).await.unwrap();
        cmd_b.send(SessionCommand::StartSearching).await.unwrap();

        cmd_a.send(SessionCommand::Like(b)).await.unwrap();
        cmd_b.send(SessionCommand::Like(a)).await.unwrap();

        for ev in [&mut ev_a, &mut ev_b] {
            let found =
                next_matching(ev, |e| matches!(e, SessionEvent::MatchFound { .. })).await;
            let SessionEvent::MatchFound { peer, .. } = found else {
                unreachable!()
            };
            assert!(peer == a || peer == b);
        }

        cmd_a.send(SessionCommand::AcceptMatch).await.unwrap();
        cmd_b.send(SessionCommand::AcceptMatch).await.unwrap();

        // Grace then the voice budget run down on virtual time.
        for ev in [&mut ev_a, &mut ev_b] {
            next_matching(ev, |e| {
                matches!(
                    e,
                    SessionEvent::CallStageChanged {
                        stage: Stage::VoiceActive,
                        ..
                    }
                )
            })
            .await;
        }
        for ev in [&mut ev_a, &mut ev_b] {
            next_matching(ev, |e| matches!(e, SessionEvent::CallEnded { .. })).await;
            next_matching(ev, |e| {
                matches!(
                    e,
                    SessionEvent::CallStageChanged {
                        stage: Stage::Decision,
                        ..
                    }
                )
            })
            .await;
        }

        cmd_a.send(SessionCommand::Shutdown).await.unwrap();
        cmd_b.send(SessionCommand::Shutdown).await.unwrap();
    }

    /// A queued `Ended` for the previous call must not tear down the call
    /// that replaced it: the voice teardown event can still be in flight
    /// when a continue decision has already started the video call.
    #[test]
    fn stale_negotiation_end_does_not_kill_the_next_call() {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let engine = Arc::new(MatchEngine::new(db.clone()));

        let user = UserId::new();
        let peer = UserId::new();
        engine.like(user, peer).unwrap();
        let LikeOutcome::Matched(matched) = engine.like(peer, user).unwrap() else {
            panic!("expected a match");
        };
        let match_id = matched.id;

        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut controller = SessionController::new(user, small_config(), db, event_tx);
        controller.start_searching().unwrap();
        controller.offer_match(matched).unwrap();
        controller.accept_match().unwrap();
        controller.tick().unwrap(); // grace elapses, voice starts
        controller.tick().unwrap();
        controller.tick().unwrap(); // voice budget exhausted -> decision
        controller.make_decision(Decision::Continue).unwrap();
        assert_eq!(controller.stage(), Stage::VideoActive);

        let (neg_event_tx, _neg_event_rx) = mpsc::unbounded_channel();
        let negotiator = Negotiator::new(
            user,
            Arc::new(MemoryRelay::new()),
            Arc::new(StaticProvider::new()),
            neg_event_tx,
        );
        let (_sig_tx, sig_rx) = mpsc::unbounded_channel();
        let mut driver = Driver {
            user,
            controller,
            negotiator,
            engine,
            transport_factory: Box::new(|| Box::new(LoopTransport::new())),
            signal_rx: Some(sig_rx),
        };

        // The voice call's teardown event arrives late.
        driver.handle_negotiator_event(NegotiatorEvent::Ended {
            call_id: CallId::for_stage(match_id, CallKind::Voice),
        });
        assert_eq!(driver.controller.stage(), Stage::VideoActive);
        assert!(driver.signal_rx.is_some());

        // The video call's own end is still honored.
        driver.handle_negotiator_event(NegotiatorEvent::Ended {
            call_id: CallId::for_stage(match_id, CallKind::Video),
        });
        assert_eq!(driver.controller.stage(), Stage::Decision);
        assert!(driver.signal_rx.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_command_surfaces_an_error_event() {
        let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let engine = Arc::new(MatchEngine::new(db.clone()));
        let relay: Arc<dyn SignalRelay> = Arc::new(MemoryRelay::new());

        let (cmd, mut events) = spawn_session(
            UserId::new(),
            small_config(),
            db,
            engine,
            relay,
            Arc::new(StaticProvider::new()),
            || Box::new(LoopTransport::new()),
        );

        // No decision is pending while idle.
        cmd.send(SessionCommand::MakeDecision(Decision::Continue))
            .await
            .unwrap();

        let event = next_matching(&mut events, |e| {
            matches!(e, SessionEvent::Error { .. })
        })
        .await;
        let SessionEvent::Error { kind, .. } = event else {
            unreachable!()
        };
        assert_eq!(kind, ErrorKind::InvalidState);

        cmd.send(SessionCommand::Shutdown).await.unwrap();
    }
}
