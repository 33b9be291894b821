//! Story session: narrative generation wired to autosave.
//!
//! A [`StorySession`] owns one [`GenerationOrchestrator`] and one
//! [`SaveCoordinator`]. It records every delivered beat and raises save
//! triggers after scene changes and player choices.
//!
//! # Example
//!
//! ```ignore
//! use taleweaver_core::{ClaudeGenerator, FallbackLibrary, JsonFileSink, StorySession, SessionConfig};
//!
//! let generator = Arc::new(ClaudeGenerator::from_env()?);
//! let sink = Arc::new(JsonFileSink::new("saves/eldoria_autosave.json"));
//! let mut session = StorySession::new(generator, FallbackLibrary::builtin()?, sink, SessionConfig::new());
//!
//! let opening = session.begin("eldoria", &["lyra".into()]).await?;
//! println!("{}", opening.content);
//!
//! let request = session.next_request(SegmentKind::Scene).with_choices();
//! let scene = session.advance(request).await?;
//! session.end().await?;
//! ```

use crate::config::CoreConfig;
use crate::fallback::{FallbackContentSelector, FallbackLibrary, SelectorConfig};
use crate::generation::{
    GenerationContext, GenerationOrchestrator, GenerationRequest, GenerationResult,
    InMemoryCatalog, NarrativeGenerator, OrchestratorConfig, WorldCatalog,
};
use crate::rate_limit::RateLimiter;
use crate::save::{
    provider_fn, ActivityFlag, GameStateSnapshot, NarrativeEntry, PersistenceSink, SaveConfig,
    SaveCoordinator, SaveError, SaveStatus, SaveTrigger, TriggerOutcome,
};
use crate::segment::{normalize_theme, Choice, SegmentKind, GENERIC_THEME};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

/// Default number of recent segments passed to the generator.
pub const DEFAULT_RECENT_WINDOW: usize = 5;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has not begun")]
    NotStarted,

    #[error("Session has already begun")]
    AlreadyStarted,

    #[error("Session has ended")]
    Ended,

    #[error("{message}")]
    RateLimited {
        message: String,
        reset_time: DateTime<Utc>,
    },
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Active,
    Ended,
}

/// Configuration for a story session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub orchestrator: OrchestratorConfig,
    pub save: SaveConfig,
    pub selector: SelectorConfig,

    /// How many recent segments go into each request's context.
    pub recent_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Defaults with a fresh session id.
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            orchestrator: OrchestratorConfig::default(),
            save: SaveConfig::default(),
            selector: SelectorConfig::default(),
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }

    /// Session settings taken from a [`CoreConfig`].
    pub fn from_core(core: &CoreConfig) -> Self {
        Self {
            orchestrator: core.orchestrator.clone(),
            save: core.save.clone(),
            selector: core.selector.clone(),
            ..Self::new()
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    pub fn with_orchestrator(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = config;
        self
    }

    pub fn with_save(mut self, config: SaveConfig) -> Self {
        self.save = config;
        self
    }

    pub fn with_selector(mut self, config: SelectorConfig) -> Self {
        self.selector = config;
        self
    }

    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window;
        self
    }
}

/// Everything a save captures.
#[derive(Debug, Clone)]
struct SessionLog {
    session_id: String,
    world_id: Option<String>,
    character_ids: Vec<String>,
    theme: String,
    narrative: Vec<NarrativeEntry>,
    choices_made: Vec<Choice>,
}

impl SessionLog {
    fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            session_id: self.session_id.clone(),
            world_id: self.world_id.clone(),
            character_ids: self.character_ids.clone(),
            theme: self.theme.clone(),
            narrative: self.narrative.clone(),
            choices_made: self.choices_made.clone(),
            captured_at: Utc::now(),
        }
    }

    fn record(&mut self, result: &GenerationResult) {
        self.narrative.push(NarrativeEntry {
            kind: result.segment_kind,
            content: result.content.clone(),
            is_ai_generated: result.is_ai_generated,
            recorded_at: result.metadata.generated_at,
        });
    }
}

fn lock(log: &Mutex<SessionLog>) -> MutexGuard<'_, SessionLog> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

/// One interactive story.
pub struct StorySession {
    orchestrator: GenerationOrchestrator,
    saves: SaveCoordinator<GameStateSnapshot>,
    log: Arc<Mutex<SessionLog>>,
    activity: ActivityFlag,
    phase: SessionPhase,
    recent_window: usize,
    limiter: Option<(Arc<RateLimiter>, String)>,
}

impl StorySession {
    /// Create a session with an empty world catalog.
    pub fn new(
        generator: Arc<dyn NarrativeGenerator>,
        library: FallbackLibrary,
        sink: Arc<dyn PersistenceSink<GameStateSnapshot>>,
        config: SessionConfig,
    ) -> Self {
        Self::with_catalog(
            generator,
            library,
            Arc::new(InMemoryCatalog::new()),
            sink,
            config,
        )
    }

    pub fn with_catalog(
        generator: Arc<dyn NarrativeGenerator>,
        library: FallbackLibrary,
        catalog: Arc<dyn WorldCatalog>,
        sink: Arc<dyn PersistenceSink<GameStateSnapshot>>,
        config: SessionConfig,
    ) -> Self {
        let selector = FallbackContentSelector::with_config(library, config.selector.clone());
        let orchestrator = GenerationOrchestrator::new(generator, selector)
            .with_config(config.orchestrator.clone())
            .with_catalog(catalog);

        let log = Arc::new(Mutex::new(SessionLog {
            session_id: config.session_id.clone(),
            world_id: None,
            character_ids: Vec::new(),
            theme: GENERIC_THEME.to_string(),
            narrative: Vec::new(),
            choices_made: Vec::new(),
        }));

        let provider = {
            let log = Arc::clone(&log);
            provider_fn(move || {
                let snapshot = lock(&log).snapshot();
                async move { Ok::<_, SaveError>(snapshot) }
            })
        };

        let activity = ActivityFlag::new(false);
        let saves =
            SaveCoordinator::with_config(Arc::new(provider), sink, config.save, activity.clone());

        Self {
            orchestrator,
            saves,
            log,
            activity,
            phase: SessionPhase::Created,
            recent_window: config.recent_window,
            limiter: None,
        }
    }

    /// Refuse [`advance`](Self::advance) calls beyond `limiter`'s budget for
    /// `identifier`.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>, identifier: impl Into<String>) -> Self {
        self.limiter = Some((limiter, identifier.into()));
        self
    }

    /// Open the story: generate the initial scene, start autosave, and save.
    pub async fn begin(
        &mut self,
        world_id: &str,
        character_ids: &[String],
    ) -> Result<GenerationResult, SessionError> {
        self.ensure_phase(SessionPhase::Created)?;
        self.check_rate()?;
        self.orchestrator.selector_mut().clear_usage_history();

        let result = self
            .orchestrator
            .generate_initial_scene(world_id, character_ids)
            .await;

        {
            let mut log = lock(&self.log);
            log.world_id = Some(world_id.to_string());
            log.character_ids = character_ids.to_vec();
            log.theme = result.metadata.theme.clone();
            log.record(&result);
        }

        self.activate();
        self.saves.spawn_save(SaveTrigger::SceneChange);
        info!(session_id = %self.session_id(), world_id, "session started");
        Ok(result)
    }

    /// Pick up a saved story where it left off.
    pub fn resume(&mut self, snapshot: GameStateSnapshot) -> Result<(), SessionError> {
        self.ensure_phase(SessionPhase::Created)?;
        {
            let mut log = lock(&self.log);
            log.session_id = snapshot.session_id;
            log.world_id = snapshot.world_id;
            log.character_ids = snapshot.character_ids;
            log.theme = normalize_theme(&snapshot.theme);
            log.narrative = snapshot.narrative;
            log.choices_made = snapshot.choices_made;
        }
        self.activate();
        info!(session_id = %self.session_id(), "session resumed");
        Ok(())
    }

    /// Request skeleton for the next beat, carrying the session's theme,
    /// ids, and recent narrative. Add tags or choices before passing it to
    /// [`advance`](Self::advance).
    pub fn next_request(&self, kind: SegmentKind) -> GenerationRequest {
        let log = lock(&self.log);
        let start = log.narrative.len().saturating_sub(self.recent_window);
        let recent = log.narrative[start..]
            .iter()
            .map(|e| e.content.clone())
            .collect();

        let mut context = GenerationContext::new(&log.theme)
            .with_session(log.session_id.clone())
            .with_characters(log.character_ids.clone())
            .with_recent_segments(recent);
        if let Some(world_id) = &log.world_id {
            context = context.with_world(world_id.clone());
        }
        GenerationRequest::new(kind, context)
    }

    /// Generate the next beat. Scene-changing beats trigger a save.
    pub async fn advance(
        &mut self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, SessionError> {
        self.ensure_phase(SessionPhase::Active)?;
        self.check_rate()?;

        let kind = request.segment_kind;
        let result = self.orchestrator.generate_segment(request).await;
        lock(&self.log).record(&result);

        if kind.changes_scene() {
            self.saves.spawn_save(SaveTrigger::SceneChange);
        }
        Ok(result)
    }

    /// Record the player's choice and save.
    pub fn choose(&mut self, choice: Choice) -> Result<(), SessionError> {
        self.ensure_phase(SessionPhase::Active)?;
        lock(&self.log).choices_made.push(choice);
        self.saves.spawn_save(SaveTrigger::PlayerChoice);
        Ok(())
    }

    /// Save now and wait for the result.
    pub async fn save_now(&self) -> TriggerOutcome {
        self.saves.trigger_save(SaveTrigger::Manual).await
    }

    /// Stop autosave, write a final save, and close the session.
    pub async fn end(&mut self) -> Result<SaveStatus, SessionError> {
        self.ensure_phase(SessionPhase::Active)?;
        self.activity.set_active(false);
        self.saves.stop();
        self.saves.wait_idle().await;

        let status = match self.saves.trigger_save(SaveTrigger::Manual).await {
            TriggerOutcome::Completed(status) => status,
            TriggerOutcome::Coalesced { .. } => self.saves.wait_idle().await,
        };
        self.phase = SessionPhase::Ended;
        info!(
            session_id = %self.session_id(),
            total_saves = status.total_saves,
            "session ended"
        );
        Ok(status)
    }

    /// Turn periodic autosave on or off.
    pub fn set_autosave(&self, enabled: bool) {
        self.saves.set_enabled(enabled);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_id(&self) -> String {
        lock(&self.log).session_id.clone()
    }

    pub fn theme(&self) -> String {
        lock(&self.log).theme.clone()
    }

    pub fn narrative(&self) -> Vec<NarrativeEntry> {
        lock(&self.log).narrative.clone()
    }

    /// Current state as it would be saved.
    pub fn snapshot(&self) -> GameStateSnapshot {
        lock(&self.log).snapshot()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.saves.status()
    }

    pub fn saves(&self) -> &SaveCoordinator<GameStateSnapshot> {
        &self.saves
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut GenerationOrchestrator {
        &mut self.orchestrator
    }

    fn activate(&mut self) {
        self.phase = SessionPhase::Active;
        self.activity.set_active(true);
        self.saves.start();
    }

    fn check_rate(&self) -> Result<(), SessionError> {
        let Some((limiter, identifier)) = &self.limiter else {
            return Ok(());
        };
        let decision = limiter.check_limit(identifier);
        if !decision.allowed {
            warn!(identifier = %identifier, "story request rate limited");
            return Err(SessionError::RateLimited {
                message: RateLimiter::error_message(decision.reset_time),
                reset_time: decision.reset_time,
            });
        }
        Ok(())
    }

    fn ensure_phase(&self, expected: SessionPhase) -> Result<(), SessionError> {
        match (self.phase, expected) {
            (actual, expected) if actual == expected => Ok(()),
            (SessionPhase::Ended, _) => Err(SessionError::Ended),
            (SessionPhase::Created, _) => Err(SessionError::NotStarted),
            (SessionPhase::Active, _) => Err(SessionError::AlreadyStarted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::generation::GeneratedContent;
    use crate::save::SaveState;
    use crate::testing::{RecordingSink, ScriptedGenerator, ScriptedOutcome};
    use std::time::Duration;

    fn session_with(
        generator: ScriptedGenerator,
        config: SessionConfig,
    ) -> (StorySession, RecordingSink<GameStateSnapshot>) {
        let sink = RecordingSink::new();
        let session = StorySession::new(
            Arc::new(generator),
            FallbackLibrary::builtin().unwrap(),
            Arc::new(sink.clone()),
            config,
        );
        (session, sink)
    }

    fn session(generator: ScriptedGenerator) -> (StorySession, RecordingSink<GameStateSnapshot>) {
        session_with(generator, SessionConfig::new().with_session_id("test-session"))
    }

    #[tokio::test]
    async fn test_lifecycle_saves() {
        let (mut session, sink) = session(ScriptedGenerator::new(vec![
            ScriptedOutcome::Content(GeneratedContent::text("You arrive at the gate.")),
            ScriptedOutcome::Content(GeneratedContent::text("The guard nods.")),
        ]));

        let opening = session.begin("unknown-world", &[]).await.unwrap();
        assert_eq!(opening.content, "You arrive at the gate.");
        assert_eq!(session.phase(), SessionPhase::Active);
        session.saves().wait_idle().await;
        assert_eq!(sink.persisted().len(), 1);
        assert_eq!(sink.persisted()[0].1, SaveTrigger::SceneChange);

        // Dialogue does not change the scene.
        let request = session.next_request(SegmentKind::Dialogue);
        assert_eq!(request.context.recent_segments, vec!["You arrive at the gate."]);
        session.advance(request).await.unwrap();
        session.saves().wait_idle().await;
        assert_eq!(sink.persisted().len(), 1);

        session.choose(Choice::new("Enter", "Pass the gate")).unwrap();
        session.saves().wait_idle().await;
        assert_eq!(sink.persisted().len(), 2);

        let status = session.end().await.unwrap();
        assert_eq!(status.state, SaveState::Saved);
        assert_eq!(status.total_saves, 3);

        let (last, trigger) = sink.persisted().pop().unwrap();
        assert_eq!(trigger, SaveTrigger::Manual);
        assert_eq!(last.session_id, "test-session");
        assert_eq!(last.narrative.len(), 2);
        assert_eq!(last.choices_made.len(), 1);
        assert!(matches!(session.end().await, Err(SessionError::Ended)));
    }

    #[tokio::test]
    async fn test_phase_errors() {
        let (mut session, _) = session(ScriptedGenerator::always_failing("network down"));
        let request = session.next_request(SegmentKind::Scene);
        assert!(matches!(
            session.advance(request).await,
            Err(SessionError::NotStarted)
        ));
        assert!(matches!(
            session.choose(Choice::new("x", "y")),
            Err(SessionError::NotStarted)
        ));

        session.begin("w", &[]).await.unwrap();
        assert!(matches!(
            session.begin("w", &[]).await,
            Err(SessionError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_fallback_keeps_story_moving() {
        let (mut session, _) = session(ScriptedGenerator::always_failing("503 overloaded"));
        session.begin("w", &[]).await.unwrap();

        let request = session
            .next_request(SegmentKind::Scene)
            .with_choices();
        let result = session.advance(request).await.unwrap();
        assert!(!result.is_ai_generated);
        assert_eq!(result.fallback_reason, Some(ErrorKind::ServiceUnavailable));
        assert!(!result.choices.unwrap().is_empty());
        assert_eq!(session.narrative().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_advance() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)).unwrap());
        let (session, _) = session(ScriptedGenerator::always_failing("network down"));
        let mut session = session.with_rate_limiter(limiter, "player-1");
        session.begin("w", &[]).await.unwrap();

        let first = session.next_request(SegmentKind::Action);
        assert!(session.advance(first).await.is_ok());

        let second = session.next_request(SegmentKind::Action);
        let err = session.advance(second).await.unwrap_err();
        assert!(matches!(err, SessionError::RateLimited { .. }));
        assert!(err.to_string().starts_with("Too many story requests."));
    }

    #[tokio::test]
    async fn test_resume_restores_state() {
        let (mut session, _) = session(ScriptedGenerator::new(vec![]));
        let mut snapshot = GameStateSnapshot::new("saved-session", "Horror");
        snapshot.world_id = Some("manor".into());
        snapshot.narrative.push(NarrativeEntry {
            kind: SegmentKind::Scene,
            content: "The door creaks.".into(),
            is_ai_generated: false,
            recorded_at: Utc::now(),
        });

        session.resume(snapshot).unwrap();
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.session_id(), "saved-session");
        assert_eq!(session.theme(), "horror");

        let request = session.next_request(SegmentKind::Scene);
        assert_eq!(request.context.theme, "horror");
        assert_eq!(request.context.world_id.as_deref(), Some("manor"));
        assert_eq!(request.context.recent_segments, vec!["The door creaks."]);
    }

    #[tokio::test]
    async fn test_recent_window_is_bounded() {
        let (mut session, _) = session_with(
            ScriptedGenerator::always_failing("network down"),
            SessionConfig::new().with_recent_window(2),
        );
        session.begin("w", &[]).await.unwrap();
        for _ in 0..3 {
            let request = session.next_request(SegmentKind::Action);
            session.advance(request).await.unwrap();
        }
        let request = session.next_request(SegmentKind::Action);
        assert_eq!(request.context.recent_segments.len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_begin() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)).unwrap());
        limiter.check_limit("player-1");

        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let sink = RecordingSink::<GameStateSnapshot>::new();
        let mut session = StorySession::new(
            generator.clone(),
            FallbackLibrary::builtin().unwrap(),
            Arc::new(sink.clone()),
            SessionConfig::new(),
        )
        .with_rate_limiter(limiter, "player-1");

        let err = session.begin("w", &[]).await.unwrap_err();
        assert!(matches!(err, SessionError::RateLimited { .. }));
        assert_eq!(session.phase(), SessionPhase::Created);
        assert_eq!(generator.calls(), 0);
        assert!(sink.persisted().is_empty());
    }

    #[tokio::test]
    async fn test_uncurated_world_theme_survives_fallback_opening() {
        let catalog = InMemoryCatalog::new().with_world(crate::generation::WorldView::new(
            "w",
            "Dry Gulch",
            "Western",
            "A dusty frontier town",
        ));
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut session = StorySession::with_catalog(
            generator.clone(),
            FallbackLibrary::builtin().unwrap(),
            Arc::new(catalog),
            Arc::new(RecordingSink::<GameStateSnapshot>::new()),
            SessionConfig::new(),
        );

        let opening = session.begin("w", &[]).await.unwrap();
        assert!(!opening.is_ai_generated);
        assert_eq!(opening.metadata.fallback_theme.as_deref(), Some(GENERIC_THEME));
        assert_eq!(session.theme(), "western");

        let request = session.next_request(SegmentKind::Scene);
        assert_eq!(request.context.theme, "western");
        session.advance(request).await.unwrap();
        assert_eq!(generator.requests().last().unwrap().context.theme, "western");
    }
}
