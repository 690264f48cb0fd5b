//! Match/Like engine: detects mutual interest and materializes a match
//! exactly once per unordered pair.
//!
//! The mutuality check and the match insert are atomic with respect to
//! other engine callers because both run under the shared database lock;
//! against writers outside this process, the UNIQUE constraint on the
//! canonical pair makes the second creation attempt a silent no-op that
//! observes the first writer's row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duet_shared::types::{PairKey, UserId};
use duet_store::{Database, Match, MatchStatus, StoreError};

/// Shared handle to the store, mirrored by the controller.
pub type SharedDb = Arc<Mutex<Database>>;

/// Result of a like action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Interest recorded; no reciprocal like yet.
    Liked,
    /// The ordered (actor, target) like already existed; nothing changed.
    AlreadyLiked,
    /// Mutual interest: the match for the pair (newly created, or the
    /// already-existing one if the other side won the race).
    Matched(Match),
}

/// Change notification delivered to a participant's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipEvent {
    /// Someone expressed interest in the subscriber.
    LikeReceived { from: UserId },
    /// A match involving the subscriber came into existence.
    MatchCreated { matched: Match, peer: UserId },
}

pub struct MatchEngine {
    db: SharedDb,
    subscribers: Mutex<HashMap<UserId, Vec<mpsc::UnboundedSender<RelationshipEvent>>>>,
}

impl MatchEngine {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to relationship changes involving `user`.
    pub fn subscribe(&self, user: UserId) -> mpsc::UnboundedReceiver<RelationshipEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.entry(user).or_default().push(tx);
        rx
    }

    /// Record that `actor` likes `target`, then check for mutuality.
    ///
    /// Re-liking is reported as [`LikeOutcome::AlreadyLiked`], not an
    /// error. When the reciprocal like exists, the match is created
    /// exactly once; both participants are notified only when this call
    /// actually brought the match into existence.
    pub fn like(&self, actor: UserId, target: UserId) -> Result<LikeOutcome, StoreError> {
        let Some(pair) = PairKey::new(actor, target) else {
            warn!(user = %actor.short(), "ignoring self-like");
            return Ok(LikeOutcome::AlreadyLiked);
        };

        // Hold the db lock across check + create so the engine itself
        // cannot race; cross-process races fall back to the UNIQUE
        // constraint inside create_match.
        let (outcome, newly_created) = {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());

            let inserted = db.create_like(actor, target)?;
            if !inserted {
                debug!(
                    actor = %actor.short(),
                    target = %target.short(),
                    "like already recorded"
                );
                return Ok(LikeOutcome::AlreadyLiked);
            }

            if !db.has_like(target, actor)? {
                (LikeOutcome::Liked, false)
            } else {
                match db.get_match_for_pair(pair)? {
                    // A settled pair stays settled; a fresh like does not
                    // resurrect a rejected or completed match.
                    Some(m)
                        if matches!(
                            m.status,
                            MatchStatus::Rejected | MatchStatus::Completed
                        ) =>
                    {
                        debug!(
                            match_id = %m.id,
                            status = ?m.status,
                            "pair already settled, recording the like only"
                        );
                        (LikeOutcome::Liked, false)
                    }
                    Some(m) => (LikeOutcome::Matched(m), false),
                    None => (LikeOutcome::Matched(db.create_match(pair)?), true),
                }
            }
        };

        // Notify outside the db lock. The like event goes to the target
        // unconditionally for every freshly recorded like.
        self.notify(target, RelationshipEvent::LikeReceived { from: actor });

        if let (LikeOutcome::Matched(matched), true) = (&outcome, newly_created) {
            info!(
                lo = %matched.pair.lo.short(),
                hi = %matched.pair.hi.short(),
                "mutual like, match materialized"
            );
            self.notify_pair(matched);
        }

        Ok(outcome)
    }

    /// Delete a like. Never retroactively deletes an already-formed match.
    pub fn unlike(&self, actor: UserId, target: UserId) -> Result<bool, StoreError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.delete_like(actor, target)
    }

    fn notify_pair(&self, matched: &Match) {
        for user in [matched.pair.lo, matched.pair.hi] {
            let Some(peer) = matched.pair.peer_of(user) else {
                continue;
            };
            self.notify(
                user,
                RelationshipEvent::MatchCreated {
                    matched: matched.clone(),
                    peer,
                },
            );
        }
    }

    fn notify(&self, user: UserId, event: RelationshipEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(senders) = subs.get_mut(&user) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MatchEngine {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        MatchEngine::new(db)
    }

    #[test]
    fn mutual_like_creates_exactly_one_match() {
        let engine = engine();
        let a = UserId::new();
        let b = UserId::new();

        assert_eq!(engine.like(a, b).unwrap(), LikeOutcome::Liked);

        let LikeOutcome::Matched(first) = engine.like(b, a).unwrap() else {
            panic!("expected a match");
        };

        // Re-liking from either side observes, never duplicates.
        assert_eq!(engine.like(a, b).unwrap(), LikeOutcome::AlreadyLiked);
        assert_eq!(engine.like(b, a).unwrap(), LikeOutcome::AlreadyLiked);

        let db = engine.db.lock().unwrap();
        let again = db
            .get_match_for_pair(PairKey::new(b, a).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(again.id, first.id);
    }

    #[test]
    fn both_participants_are_notified_once() {
        let engine = engine();
        let a = UserId::new();
        let b = UserId::new();

        let mut rx_a = engine.subscribe(a);
        let mut rx_b = engine.subscribe(b);

        engine.like(a, b).unwrap();
        assert_eq!(
            rx_b.try_recv().unwrap(),
            RelationshipEvent::LikeReceived { from: a }
        );
        assert!(rx_a.try_recv().is_err());

        engine.like(b, a).unwrap();
        assert_eq!(
            rx_a.try_recv().unwrap(),
            RelationshipEvent::LikeReceived { from: b }
        );

        let RelationshipEvent::MatchCreated { peer, .. } = rx_a.try_recv().unwrap() else {
            panic!("expected a match notification");
        };
        assert_eq!(peer, b);
        let RelationshipEvent::MatchCreated { peer, .. } = rx_b.try_recv().unwrap() else {
            panic!("expected a match notification");
        };
        assert_eq!(peer, a);

        // No duplicate notifications from subsequent likes.
        engine.like(a, b).unwrap();
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn unlike_does_not_touch_an_existing_match() {
        let engine = engine();
        let a = UserId::new();
        let b = UserId::new();

        engine.like(a, b).unwrap();
        let LikeOutcome::Matched(m) = engine.like(b, a).unwrap() else {
            panic!("expected a match");
        };

        assert!(engine.unlike(a, b).unwrap());

        let db = engine.db.lock().unwrap();
        assert_eq!(db.get_match(m.id).unwrap().id, m.id);
        assert!(!db.has_like(a, b).unwrap());
    }

    #[test]
    fn a_rejected_match_is_not_resurfaced_by_a_new_like() {
        let engine = engine();
        let a = UserId::new();
        let b = UserId::new();

        engine.like(a, b).unwrap();
        let LikeOutcome::Matched(m) = engine.like(b, a).unwrap() else {
            panic!("expected a match");
        };

        {
            let db = engine.db.lock().unwrap();
            db.update_match_status(m.id, MatchStatus::Rejected).unwrap();
        }

        // One side walks away and later comes back around.
        assert!(engine.unlike(a, b).unwrap());
        let mut rx_a = engine.subscribe(a);
        let mut rx_b = engine.subscribe(b);

        assert_eq!(engine.like(a, b).unwrap(), LikeOutcome::Liked);

        // The target hears about the like, but nobody is offered the
        // dead match again.
        assert_eq!(
            rx_b.try_recv().unwrap(),
            RelationshipEvent::LikeReceived { from: a }
        );
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn self_like_is_a_noop() {
        let engine = engine();
        let a = UserId::new();
        assert_eq!(engine.like(a, a).unwrap(), LikeOutcome::AlreadyLiked);
    }
}
