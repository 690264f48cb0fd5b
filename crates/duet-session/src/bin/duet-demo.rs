//! Two in-process sessions walking the whole lifecycle.
//!
//! Runs two users over an in-memory relay with synthetic transports,
//! mutual-likes them, and drives both sessions through the voice call,
//! the escalation decision, the video call, and the final resolution,
//! printing every session event on the way.
//!
//! ```sh
//! cargo run --bin duet-demo
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duet_media::{LoopTransport, StaticProvider};
use duet_session::{
    spawn_session, Decision, MatchEngine, SessionCommand, SessionConfig, SessionEvent, SharedDb,
    Stage,
};
use duet_shared::types::UserId;
use duet_signal::{MemoryRelay, SignalRelay};
use duet_store::{
    Database, Gender, PreferredGender, Profile, RelationshipGoal,
};

/// Short budgets so the demo finishes in under a minute.
fn demo_config() -> SessionConfig {
    SessionConfig {
        prepare_grace_secs: 2,
        voice_secs: 5,
        video_secs: 5,
    }
}

struct Participant {
    name: &'static str,
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Participant {
    async fn send(&self, cmd: SessionCommand) -> anyhow::Result<()> {
        self.commands.send(cmd).await?;
        Ok(())
    }

    /// Print events until one matches the predicate.
    async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> anyhow::Result<SessionEvent> {
        loop {
            let event = self
                .events
                .recv()
                .await
                .ok_or_else(|| anyhow::anyhow!("session for {} ended early", self.name))?;
            match &event {
                // Per-second countdown noise stays at debug volume.
                SessionEvent::CallStageChanged { stage, remaining } => {
                    tracing::debug!(who = self.name, ?stage, remaining, "countdown");
                }
                other => {
                    info!(who = self.name, event = %serde_json::to_string(other)?, "session event");
                }
            }
            if pred(&event) {
                return Ok(event);
            }
        }
    }

    async fn wait_for_stage(&mut self, want: Stage) -> anyhow::Result<()> {
        self.wait_for(|e| matches!(e, SessionEvent::CallStageChanged { stage, .. } if *stage == want))
            .await?;
        info!(who = self.name, stage = ?want, "reached stage");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duet_session=debug")),
        )
        .init();

    info!("duet demo v{}", env!("CARGO_PKG_VERSION"));

    let db: SharedDb = Arc::new(Mutex::new(Database::open_in_memory()?));
    let engine = Arc::new(MatchEngine::new(db.clone()));
    let relay: Arc<dyn SignalRelay> = Arc::new(MemoryRelay::new());

    let alice_id = signup(&db, "Alice", 29, Gender::Female, PreferredGender::Male)?;
    let bob_id = signup(&db, "Bob", 31, Gender::Male, PreferredGender::Female)?;

    let mut alice = spawn_participant("alice", alice_id, &db, &engine, &relay);
    let mut bob = spawn_participant("bob", bob_id, &db, &engine, &relay);

    // Discovery: both opt in, then a mutual like materializes the match.
    alice.send(SessionCommand::StartSearching).await?;
    bob.send(SessionCommand::StartSearching).await?;
    alice.send(SessionCommand::Like(bob_id)).await?;
    bob.send(SessionCommand::Like(alice_id)).await?;

    alice
        .wait_for(|e| matches!(e, SessionEvent::MatchFound { .. }))
        .await?;
    bob.wait_for(|e| matches!(e, SessionEvent::MatchFound { .. }))
        .await?;

    alice.send(SessionCommand::AcceptMatch).await?;
    bob.send(SessionCommand::AcceptMatch).await?;

    // Grace period, then the timed voice call runs its budget down and
    // both land in the decision stage.
    alice.wait_for_stage(Stage::VoiceActive).await?;
    bob.wait_for_stage(Stage::VoiceActive).await?;
    alice.wait_for_stage(Stage::Decision).await?;
    bob.wait_for_stage(Stage::Decision).await?;

    // Both continue: escalate to video.
    alice
        .send(SessionCommand::MakeDecision(Decision::Continue))
        .await?;
    bob.send(SessionCommand::MakeDecision(Decision::Continue))
        .await?;

    alice.wait_for_stage(Stage::VideoActive).await?;
    bob.wait_for_stage(Stage::VideoActive).await?;
    alice.wait_for_stage(Stage::Decision).await?;
    bob.wait_for_stage(Stage::Decision).await?;

    // Final resolution.
    alice
        .send(SessionCommand::MakeDecision(Decision::Continue))
        .await?;
    bob.send(SessionCommand::MakeDecision(Decision::End)).await?;

    bob.wait_for(|e| matches!(e, SessionEvent::MatchRejected { .. }))
        .await?;

    alice.send(SessionCommand::Shutdown).await?;
    bob.send(SessionCommand::Shutdown).await?;

    info!("demo complete");
    Ok(())
}

fn signup(
    db: &SharedDb,
    name: &str,
    age: u32,
    gender: Gender,
    preferred_gender: PreferredGender,
) -> anyhow::Result<UserId> {
    let profile = Profile {
        id: UserId::new(),
        name: name.to_string(),
        age,
        gender,
        preferred_gender,
        location: "demo".to_string(),
        bio: None,
        avatar: None,
        relationship_goal: RelationshipGoal::Serious,
        premium: false,
        created_at: chrono::Utc::now(),
    };
    db.lock()
        .unwrap_or_else(|e| e.into_inner())
        .create_profile(&profile)?;
    info!(name, id = %profile.id.short(), "profile created");
    Ok(profile.id)
}

fn spawn_participant(
    name: &'static str,
    user: UserId,
    db: &SharedDb,
    engine: &Arc<MatchEngine>,
    relay: &Arc<dyn SignalRelay>,
) -> Participant {
    let (commands, events) = spawn_session(
        user,
        demo_config(),
        db.clone(),
        engine.clone(),
        relay.clone(),
        Arc::new(StaticProvider::new()),
        || Box::new(LoopTransport::new()),
    );
    Participant {
        name,
        commands,
        events,
    }
}
