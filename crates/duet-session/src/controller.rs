//! Call session controller.
//!
//! A synchronous state machine driving match discovery, the call-stage
//! transitions, and the countdown. One instance per logged-in user; it is
//! the only writer of its [`SessionState`]. Side effects that involve the
//! negotiator are returned as [`Effect`]s for the async driver to apply,
//! which keeps every transition unit-testable without a runtime.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duet_shared::types::{CallId, CallKind, UserId};
use duet_store::{Call, CallStatus, Match, MatchStatus};

use crate::config::SessionConfig;
use crate::engine::SharedDb;
use crate::error::SessionError;
use crate::events::{ErrorKind, SessionEvent};
use crate::state::{SessionState, Stage};

/// The participant's choice at the decision stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    End,
}

/// Negotiator-facing side effect of a transition. The controller never
/// touches the negotiator directly; the driver applies these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Begin media negotiation for this call.
    StartNegotiation { call: Call, peer: UserId },
    /// Tear down any active negotiation.
    StopNegotiation,
}

pub struct SessionController {
    config: SessionConfig,
    db: SharedDb,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: SessionState,
}

impl SessionController {
    pub fn new(
        user: UserId,
        config: SessionConfig,
        db: SharedDb,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            db,
            events,
            state: SessionState::new(user),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Opt in to match discovery.
    pub fn start_searching(&mut self) -> Result<(), SessionError> {
        match self.state.stage {
            Stage::Idle | Stage::Searching => {
                self.state.stage = Stage::Searching;
                self.state.is_searching = true;
                debug!(user = %self.state.user.short(), "searching for matches");
                Ok(())
            }
            stage => Err(SessionError::InvalidState {
                operation: "start_searching",
                stage,
            }),
        }
    }

    /// Cancel discovery. No-op when not searching.
    pub fn stop_searching(&mut self) {
        if self.state.stage == Stage::Searching {
            self.state.stage = Stage::Idle;
        }
        self.state.is_searching = false;
    }

    /// Surface a match to this user (engine notification or directory
    /// scan). Ignored unless currently searching: a match that arrives
    /// while another is in flight stays in the store for later.
    pub fn offer_match(&mut self, matched: Match) -> Result<(), SessionError> {
        if self.state.stage != Stage::Searching {
            debug!(match_id = %matched.id, stage = ?self.state.stage, "match arrived while busy, ignoring");
            return Ok(());
        }
        let Some(peer) = matched.pair.peer_of(self.state.user) else {
            warn!(match_id = %matched.id, "offered a match that does not involve this user");
            return Ok(());
        };

        info!(match_id = %matched.id, peer = %peer.short(), "match found");
        self.state.stage = Stage::MatchPending;
        self.state.is_searching = false;
        self.emit(SessionEvent::MatchFound {
            match_id: matched.id,
            peer,
        });
        self.state.current_match = Some(matched);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Match accept/reject
    // ------------------------------------------------------------------

    /// Accept the pending match and enter the preparation grace period.
    pub fn accept_match(&mut self) -> Result<(), SessionError> {
        if self.state.stage != Stage::MatchPending {
            return Err(SessionError::InvalidState {
                operation: "accept_match",
                stage: self.state.stage,
            });
        }
        let matched = self
            .state
            .current_match
            .as_mut()
            .expect("match_pending stage always carries a match");

        {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.update_match_status(matched.id, MatchStatus::Accepted)?;
        }
        matched.status = MatchStatus::Accepted;

        self.state.stage = Stage::Preparing;
        self.state.time_remaining = self.config.prepare_grace_secs;
        info!(grace = self.config.prepare_grace_secs, "match accepted, preparing call");
        self.emit(SessionEvent::CallStageChanged {
            stage: Stage::Preparing,
            remaining: self.state.time_remaining,
        });
        Ok(())
    }

    /// Decline the pending match and resume searching.
    pub fn reject_match(&mut self) -> Result<(), SessionError> {
        if self.state.stage != Stage::MatchPending {
            return Err(SessionError::InvalidState {
                operation: "reject_match",
                stage: self.state.stage,
            });
        }
        let matched = self
            .state
            .current_match
            .take()
            .expect("match_pending stage always carries a match");

        {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.update_match_status(matched.id, MatchStatus::Rejected)?;
        }

        info!(match_id = %matched.id, "match declined, resuming search");
        self.emit(SessionEvent::MatchRejected {
            match_id: matched.id,
        });
        self.state.clear_activity();
        self.state.stage = Stage::Searching;
        self.state.is_searching = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Countdown
    // ------------------------------------------------------------------

    /// Advance the single 1-second tick source.
    ///
    /// Only the grace period and active calls count down. Reaching zero
    /// in an active call is the one automatic trigger into the decision
    /// stage; it fires exactly once because the transition leaves the
    /// active stage.
    pub fn tick(&mut self) -> Result<Effect, SessionError> {
        match self.state.stage {
            Stage::Preparing => {
                self.state.time_remaining = self.state.time_remaining.saturating_sub(1);
                self.emit(SessionEvent::CallStageChanged {
                    stage: Stage::Preparing,
                    remaining: self.state.time_remaining,
                });
                if self.state.time_remaining == 0 {
                    return self.begin_call(CallKind::Voice);
                }
                Ok(Effect::None)
            }
            Stage::VoiceActive | Stage::VideoActive => {
                self.state.time_remaining = self.state.time_remaining.saturating_sub(1);
                self.emit(SessionEvent::CallStageChanged {
                    stage: self.state.stage,
                    remaining: self.state.time_remaining,
                });
                if self.state.time_remaining == 0 {
                    debug!("call budget exhausted");
                    return self.finish_call();
                }
                Ok(Effect::None)
            }
            _ => Ok(Effect::None),
        }
    }

    // ------------------------------------------------------------------
    // Call end / decision
    // ------------------------------------------------------------------

    /// Manually end the active call.
    ///
    /// Idempotent: outside an active call this is a no-op, so a second
    /// call (or a late negotiator teardown racing a manual end) produces
    /// no duplicate `CallEnded`.
    pub fn end_call(&mut self) -> Result<Effect, SessionError> {
        if !self.state.stage.is_call_active() {
            debug!(stage = ?self.state.stage, "end_call outside an active call, ignoring");
            return Ok(Effect::None);
        }
        self.finish_call()
    }

    /// Resolve the decision stage.
    ///
    /// Valid only while in `Decision`; anywhere else this is a caller bug
    /// surfaced as [`SessionError::InvalidState`] with no state change.
    pub fn make_decision(&mut self, decision: Decision) -> Result<Effect, SessionError> {
        if self.state.stage != Stage::Decision {
            return Err(SessionError::InvalidState {
                operation: "make_decision",
                stage: self.state.stage,
            });
        }

        let last_kind = self
            .state
            .current_call
            .as_ref()
            .map(|c| c.kind)
            .expect("decision stage always follows a call");

        match (decision, last_kind) {
            (Decision::Continue, CallKind::Voice) => {
                info!("both may continue, escalating to video");
                self.begin_call(CallKind::Video)
            }
            (Decision::Continue, CallKind::Video) => {
                // Fully resolved: contact exchange happens outside this
                // core. Close the match positively and go idle.
                let matched = self
                    .state
                    .current_match
                    .take()
                    .expect("decision stage always carries a match");
                {
                    let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
                    db.update_match_status(matched.id, MatchStatus::Completed)?;
                }
                info!(match_id = %matched.id, "session resolved, match completed");
                self.state.clear_activity();
                self.state.stage = Stage::Idle;
                self.state.is_searching = false;
                Ok(Effect::None)
            }
            (Decision::End, _) => {
                let matched = self
                    .state
                    .current_match
                    .take()
                    .expect("decision stage always carries a match");
                {
                    let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
                    db.update_match_status(matched.id, MatchStatus::Rejected)?;
                }
                info!(match_id = %matched.id, "match ended, resuming search");
                self.emit(SessionEvent::MatchRejected {
                    match_id: matched.id,
                });
                self.state.clear_activity();
                self.state.stage = Stage::Searching;
                self.state.is_searching = true;
                Ok(Effect::None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Report / failure / reset
    // ------------------------------------------------------------------

    /// File an abuse report. When a match or call is in flight it is
    /// terminated immediately, regardless of stage, and the session
    /// returns to idle. A report with nothing in flight (idle, searching)
    /// only records the report and leaves the session as it was.
    pub fn report_user(
        &mut self,
        reported: UserId,
        reason: &str,
    ) -> Result<Effect, SessionError> {
        let call_id = self.state.current_call.as_ref().map(|c| c.id);

        let report = {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.create_report(self.state.user, reported, call_id, reason)?
        };
        self.emit(SessionEvent::ReportSubmitted {
            report_id: report.id,
        });

        if !self.state.stage.has_match() {
            debug!(stage = ?self.state.stage, "report filed with nothing in flight");
            return Ok(Effect::None);
        }

        self.close_current(CallStatus::Rejected, MatchStatus::Rejected)?;
        self.state.stage = Stage::Idle;
        self.state.is_searching = false;
        Ok(Effect::StopNegotiation)
    }

    /// A fatal call-setup or connectivity error reported by the
    /// negotiator. Ends the call and match cleanly; the session lands in
    /// a searchable idle state instead of hanging mid-transition.
    pub fn fail_call(&mut self, kind: ErrorKind, message: String) -> Effect {
        warn!(?kind, message, "call failed");
        self.emit(SessionEvent::Error { kind, message });

        if let Err(e) = self.close_current(CallStatus::Rejected, MatchStatus::Rejected) {
            // The store refusing to record the failure must not keep the
            // session stuck; log and fall through to idle.
            warn!(error = %e, "failed to persist call failure");
        }
        self.state.stage = Stage::Idle;
        self.state.is_searching = false;
        Effect::StopNegotiation
    }

    /// Wholesale reset (logout).
    pub fn reset(&mut self) -> Effect {
        self.state.clear_activity();
        self.state.stage = Stage::Idle;
        self.state.is_searching = false;
        Effect::StopNegotiation
    }

    /// Surface an error to the UI without touching state.
    pub fn emit_error(&self, kind: ErrorKind, message: String) {
        self.emit(SessionEvent::Error { kind, message });
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Create and persist a call of the given kind, start its countdown,
    /// and hand the driver a negotiation request.
    fn begin_call(&mut self, kind: CallKind) -> Result<Effect, SessionError> {
        let matched = self
            .state
            .current_match
            .as_ref()
            .expect("call stages always carry a match");
        let peer = matched
            .pair
            .peer_of(self.state.user)
            .expect("current match always involves this user");

        let budget = self.config.budget_for(kind);
        // Derived, not random: the peer computes the same id and meets us
        // on the same relay channel.
        let call = Call {
            id: CallId::for_stage(matched.id, kind),
            match_id: matched.id,
            kind,
            status: CallStatus::Active,
            duration_secs: budget,
            started_at: Some(Utc::now()),
            ended_at: None,
        };

        {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.create_call(&call)?;
        }

        self.state.stage = match kind {
            CallKind::Voice => Stage::VoiceActive,
            CallKind::Video => Stage::VideoActive,
        };
        self.state.time_remaining = budget;
        self.state.current_call = Some(call.clone());

        info!(call = %call.id, kind = %kind, budget, "call started");
        self.emit(SessionEvent::CallStageChanged {
            stage: self.state.stage,
            remaining: budget,
        });

        Ok(Effect::StartNegotiation { call, peer })
    }

    /// Move an active call into the decision stage.
    fn finish_call(&mut self) -> Result<Effect, SessionError> {
        let call = self
            .state
            .current_call
            .as_mut()
            .expect("active call stages always carry a call");

        {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.update_call_status(call.id, CallStatus::Completed)?;
        }
        call.status = CallStatus::Completed;
        call.ended_at = Some(Utc::now());
        let call_id = call.id;

        self.state.stage = Stage::Decision;
        self.state.time_remaining = 0;

        info!(call = %call_id, "call ended, awaiting decision");
        self.emit(SessionEvent::CallEnded { call_id });
        self.emit(SessionEvent::CallStageChanged {
            stage: Stage::Decision,
            remaining: 0,
        });

        Ok(Effect::StopNegotiation)
    }

    /// Close any in-flight call and match with the given terminal
    /// statuses, emitting `CallEnded` if a call was still live.
    fn close_current(
        &mut self,
        call_status: CallStatus,
        match_status: MatchStatus,
    ) -> Result<(), SessionError> {
        if let Some(call) = self.state.current_call.take() {
            if call.status == CallStatus::Active {
                let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
                db.update_call_status(call.id, call_status)?;
                drop(db);
                self.emit(SessionEvent::CallEnded { call_id: call.id });
            }
        }
        if let Some(matched) = self.state.current_match.take() {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.update_match_status(matched.id, match_status)?;
        }
        self.state.clear_activity();
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event receiver dropped");
        }
    }
}
