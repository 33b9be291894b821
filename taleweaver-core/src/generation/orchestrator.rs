//! Retry-then-fallback orchestration around a [`NarrativeGenerator`].

use super::backoff::Backoff;
use super::types::{
    AttemptOutcome, GenerationAttempt, GenerationContext, GenerationMetadata, GenerationRequest,
    GenerationResult,
};
use super::world::{InMemoryCatalog, WorldCatalog};
use super::{GeneratedContent, GeneratorError, NarrativeGenerator};
use crate::classify::{classify_error, error_chain_message, ErrorKind};
use crate::fallback::choices::choices_from_tags;
use crate::fallback::{choices_for_entry, generic_choices, FallbackContentSelector};
use crate::segment::{normalize_theme, Choice, SegmentKind, GENERIC_THEME};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default text when neither the generator nor the library has anything.
pub const MINIMAL_FALLBACK_TEXT: &str = "The story pauses for a moment as you gather your thoughts.";

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,

    pub backoff: Backoff,

    /// Upper bound on a single attempt; `None` leaves it to the generator.
    pub attempt_timeout: Option<Duration>,

    /// Delivered when the library has nothing for a request.
    pub minimal_fallback_text: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::None,
            attempt_timeout: None,
            minimal_fallback_text: MINIMAL_FALLBACK_TEXT.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Blank text is ignored.
    pub fn with_minimal_fallback_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.minimal_fallback_text = text;
        }
        self
    }
}

/// Produces a narrative segment for every request, AI or not.
pub struct GenerationOrchestrator {
    generator: Arc<dyn NarrativeGenerator>,
    selector: FallbackContentSelector,
    catalog: Arc<dyn WorldCatalog>,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn NarrativeGenerator>, selector: FallbackContentSelector) -> Self {
        Self {
            generator,
            selector,
            catalog: Arc::new(InMemoryCatalog::new()),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn WorldCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn selector(&self) -> &FallbackContentSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut FallbackContentSelector {
        &mut self.selector
    }

    /// Generate one segment.
    ///
    /// Retryable failures are retried up to `max_retries` times. When the
    /// generator gives up, curated content is selected instead; if none
    /// exists, the configured minimal text is used. Never fails.
    pub async fn generate_segment(&mut self, request: GenerationRequest) -> GenerationResult {
        let mut attempts = Vec::new();
        let mut retries = 0u32;

        let failure = loop {
            let started_at = Utc::now();
            let index = attempts.len() as u32;

            match self.attempt(&request).await {
                Ok(content) => {
                    attempts.push(GenerationAttempt {
                        index,
                        started_at,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    debug!(kind = %request.segment_kind, retries, "generated segment");
                    return self.ai_result(&request, content, attempts, retries);
                }
                Err(err) => {
                    let classification = classify_error(&err);
                    let message = error_chain_message(&err);
                    warn!(
                        kind = %request.segment_kind,
                        attempt = index,
                        error_kind = %classification.kind,
                        error = %message,
                        "generation attempt failed"
                    );
                    attempts.push(GenerationAttempt {
                        index,
                        started_at,
                        outcome: AttemptOutcome::Failed {
                            kind: classification.kind,
                            message,
                        },
                    });

                    if !classification.retryable || retries >= self.config.max_retries {
                        break classification.kind;
                    }
                    retries += 1;
                    let delay = self.config.backoff.delay_for(retries);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        };

        self.fallback_result(&request, failure, attempts, retries)
    }

    /// Generate the opening scene for a world and its characters.
    ///
    /// The world's theme drives both the prompt and fallback selection, and
    /// the result is always tagged with it. Unknown worlds use the generic
    /// theme.
    pub async fn generate_initial_scene(
        &mut self,
        world_id: &str,
        character_ids: &[String],
    ) -> GenerationResult {
        let world = self.catalog.world(world_id);
        let theme = world
            .as_ref()
            .map(|w| normalize_theme(&w.theme))
            .unwrap_or_else(|| GENERIC_THEME.to_string());

        let mut context = GenerationContext::new(&theme)
            .with_world(world_id)
            .with_characters(character_ids.to_vec());

        match &world {
            Some(world) => {
                context = context
                    .with_tags(&world.tags)
                    .with_note(format!("World: {}. {}", world.name, world.description));
            }
            None => warn!(world_id, "unknown world, using generic theme"),
        }

        for id in character_ids {
            if let Some(character) = self.catalog.character(id) {
                context = context.with_note(format!(
                    "Character: {}, {}",
                    character.name, character.summary
                ));
            }
        }

        let request = GenerationRequest::new(SegmentKind::InitialScene, context).with_choices();
        let mut result = self.generate_segment(request).await;
        result.tags.insert(theme);
        info!(
            world_id,
            ai = result.is_ai_generated,
            "opening scene ready"
        );
        result
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, GeneratorError> {
        let content = match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.generator.generate(request))
                .await
                .map_err(|_| GeneratorError::Timeout(limit))??,
            None => self.generator.generate(request).await?,
        };

        if content.text.trim().is_empty() {
            return Err(GeneratorError::EmptyContent);
        }
        Ok(content)
    }

    fn ai_result(
        &self,
        request: &GenerationRequest,
        content: GeneratedContent,
        attempts: Vec<GenerationAttempt>,
        retries: u32,
    ) -> GenerationResult {
        let tags = request.context.tags.clone();
        let choices = if !content.choices.is_empty() {
            Some(content.choices)
        } else if request.parameters.include_choices {
            Some(derived_or_generic(&tags))
        } else {
            None
        };

        GenerationResult {
            content: content.text,
            is_ai_generated: true,
            fallback_reason: None,
            segment_kind: request.segment_kind,
            tags,
            choices,
            metadata: GenerationMetadata {
                retry_attempts: retries,
                attempts,
                theme: request.context.theme.clone(),
                fallback_entry_id: None,
                fallback_theme: None,
                generated_at: Utc::now(),
            },
        }
    }

    fn fallback_result(
        &mut self,
        request: &GenerationRequest,
        reason: ErrorKind,
        attempts: Vec<GenerationAttempt>,
        retries: u32,
    ) -> GenerationResult {
        let include_choices = request.parameters.include_choices;
        let selection = self.selector.select(
            &request.context.theme,
            request.segment_kind,
            &request.context.tags,
        );

        let (content, tags, choices, bucket_theme, entry_id) = match selection {
            Some(selection) => {
                info!(
                    kind = %request.segment_kind,
                    entry = %selection.entry.id,
                    reason = %reason,
                    "serving fallback content"
                );
                let choices = include_choices.then(|| choices_for_entry(&selection.entry));
                (
                    selection.entry.body,
                    selection.entry.tags,
                    choices,
                    Some(selection.theme),
                    Some(selection.entry.id),
                )
            }
            None => {
                error!(
                    kind = %request.segment_kind,
                    theme = %request.context.theme,
                    "no fallback content available"
                );
                (
                    self.config.minimal_fallback_text.clone(),
                    request.context.tags.clone(),
                    include_choices.then(generic_choices),
                    None,
                    None,
                )
            }
        };

        GenerationResult {
            content,
            is_ai_generated: false,
            fallback_reason: Some(reason),
            segment_kind: request.segment_kind,
            tags,
            choices,
            metadata: GenerationMetadata {
                retry_attempts: retries,
                attempts,
                theme: request.context.theme.clone(),
                fallback_entry_id: entry_id,
                fallback_theme: bucket_theme.filter(|t| *t != request.context.theme),
                generated_at: Utc::now(),
            },
        }
    }
}

fn derived_or_generic(tags: &BTreeSet<String>) -> Vec<Choice> {
    let derived = choices_from_tags(tags);
    if derived.is_empty() {
        generic_choices()
    } else {
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{FallbackLibrary, SelectionTier};
    use crate::generation::world::{CharacterView, WorldView};
    use crate::testing::{ScriptedGenerator, ScriptedOutcome};

    fn selector() -> FallbackContentSelector {
        FallbackContentSelector::new(FallbackLibrary::builtin().unwrap())
    }

    fn forest_request() -> GenerationRequest {
        GenerationRequest::new(
            SegmentKind::Scene,
            GenerationContext::new("fantasy").with_tags(["forest"]),
        )
        .with_choices()
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let generator = Arc::new(ScriptedGenerator::new(vec![ScriptedOutcome::Content(
            GeneratedContent::text("The trees whisper your name.")
                .with_choices(vec![Choice::new("Answer", "See who calls")]),
        )]));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector());

        let result = orchestrator.generate_segment(forest_request()).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.content, "The trees whisper your name.");
        assert_eq!(result.fallback_reason, None);
        assert_eq!(result.metadata.retry_attempts, 0);
        assert_eq!(result.metadata.attempts.len(), 1);
        assert_eq!(result.choices.unwrap()[0].text, "Answer");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ScriptedOutcome::Fail("connection reset by peer".into()),
            ScriptedOutcome::Content(GeneratedContent::text("Moss muffles your steps.")),
        ]));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector());

        let result = orchestrator.generate_segment(forest_request()).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.metadata.retry_attempts, 1);
        assert_eq!(
            result.metadata.attempts[0].outcome,
            AttemptOutcome::Failed {
                kind: ErrorKind::Network,
                message: "connection reset by peer".into()
            }
        );
        // No choices from the model, so they are derived from the tags.
        let choices = result.choices.unwrap();
        assert!(choices[0].text.contains("woods"));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back() {
        let generator = Arc::new(ScriptedGenerator::always_failing("timeout waiting for model"));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector());

        let result = orchestrator.generate_segment(forest_request()).await;
        assert!(!result.is_ai_generated);
        assert_eq!(result.fallback_reason, Some(ErrorKind::Timeout));
        assert_eq!(result.metadata.retry_attempts, 2);
        assert_eq!(result.metadata.attempts.len(), 3);
        assert!(result.tags.contains("forest"));
        assert!(result.metadata.fallback_entry_id.is_some());
        assert!(!result.choices.unwrap().is_empty());
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let generator = Arc::new(ScriptedGenerator::always_failing("401 Unauthorized"));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector());

        let result = orchestrator.generate_segment(forest_request()).await;
        assert_eq!(result.fallback_reason, Some(ErrorKind::Auth));
        assert_eq!(result.metadata.retry_attempts, 0);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_count_respects_config() {
        let generator = Arc::new(ScriptedGenerator::always_failing("503 service unavailable"));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector())
            .with_config(OrchestratorConfig::default().with_max_retries(0));

        let result = orchestrator.generate_segment(forest_request()).await;
        assert_eq!(result.fallback_reason, Some(ErrorKind::ServiceUnavailable));
        assert_eq!(result.metadata.retry_attempts, 0);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_content_counts_as_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ScriptedOutcome::Content(GeneratedContent::text("   ")),
            ScriptedOutcome::Content(GeneratedContent::text("A crow lands nearby.")),
        ]));
        let mut orchestrator = GenerationOrchestrator::new(generator, selector());

        let result = orchestrator.generate_segment(forest_request()).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.content, "A crow lands nearby.");
        assert_eq!(result.metadata.retry_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_and_backoff() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ScriptedOutcome::Hang,
            ScriptedOutcome::Content(GeneratedContent::text("Dawn breaks.")),
        ]));
        let config = OrchestratorConfig::default()
            .with_attempt_timeout(Duration::from_secs(5))
            .with_backoff(Backoff::Fixed(Duration::from_secs(1)));
        let mut orchestrator =
            GenerationOrchestrator::new(generator, selector()).with_config(config);

        let started = tokio::time::Instant::now();
        let result = orchestrator.generate_segment(forest_request()).await;
        assert!(result.is_ai_generated);
        assert_eq!(result.metadata.retry_attempts, 1);
        assert!(matches!(
            result.metadata.attempts[0].outcome,
            AttemptOutcome::Failed { kind: ErrorKind::Timeout, .. }
        ));
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_minimal_text_when_library_empty() {
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator = GenerationOrchestrator::new(
            generator,
            FallbackContentSelector::new(FallbackLibrary::new()),
        );

        let result = orchestrator.generate_segment(forest_request()).await;
        assert_eq!(result.content, MINIMAL_FALLBACK_TEXT);
        assert_eq!(result.fallback_reason, Some(ErrorKind::Network));
        assert_eq!(result.metadata.fallback_entry_id, None);
        assert_eq!(result.choices.unwrap(), generic_choices());

        let plain = GenerationRequest::new(SegmentKind::Dialogue, GenerationContext::new("x"));
        assert!(orchestrator.generate_segment(plain).await.choices.is_none());
    }

    #[tokio::test]
    async fn test_custom_minimal_text() {
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let config = OrchestratorConfig::default()
            .with_minimal_fallback_text("   ")
            .with_minimal_fallback_text("Silence settles.");
        let mut orchestrator = GenerationOrchestrator::new(
            generator,
            FallbackContentSelector::new(FallbackLibrary::new()),
        )
        .with_config(config);

        let result = orchestrator.generate_segment(forest_request()).await;
        assert_eq!(result.content, "Silence settles.");
    }

    #[tokio::test]
    async fn test_consecutive_fallbacks_do_not_repeat() {
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator = GenerationOrchestrator::new(generator, selector());

        let first = orchestrator.generate_segment(forest_request()).await;
        let second = orchestrator.generate_segment(forest_request()).await;
        assert_ne!(first.content, second.content);
        assert!(first.tags.contains("forest"));
        assert!(second.tags.contains("forest"));
    }

    #[tokio::test]
    async fn test_initial_scene_uses_world_theme() {
        let catalog = InMemoryCatalog::new()
            .with_world(
                WorldView::new("w1", "Eldoria", "Fantasy", "A realm of old forests")
                    .with_tags(["forest"]),
            )
            .with_character(CharacterView::new("c1", "Lyra", "a wary ranger"));
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator = GenerationOrchestrator::new(generator.clone(), selector())
            .with_catalog(Arc::new(catalog));

        let result = orchestrator
            .generate_initial_scene("w1", &["c1".to_string()])
            .await;
        assert_eq!(result.segment_kind, SegmentKind::InitialScene);
        assert!(!result.content.is_empty());
        assert!(result.tags.contains("fantasy"));
        assert_eq!(result.metadata.theme, "fantasy");
        assert!(result.choices.is_some());

        let seen = generator.requests();
        assert_eq!(seen[0].context.world_id.as_deref(), Some("w1"));
        assert!(seen[0].context.notes.iter().any(|n| n.contains("Lyra")));
    }

    #[tokio::test]
    async fn test_initial_scene_unknown_world_is_generic() {
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator = GenerationOrchestrator::new(generator, selector());

        let result = orchestrator.generate_initial_scene("nowhere", &[]).await;
        assert!(!result.content.is_empty());
        assert!(result.tags.contains(GENERIC_THEME));
        assert_eq!(result.metadata.theme, GENERIC_THEME);
        assert_eq!(result.metadata.fallback_theme, None);
    }

    #[tokio::test]
    async fn test_uncurated_theme_keeps_requested_theme() {
        let catalog = InMemoryCatalog::new().with_world(WorldView::new(
            "w",
            "Dry Gulch",
            "Western",
            "A dusty frontier town",
        ));
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator =
            GenerationOrchestrator::new(generator, selector()).with_catalog(Arc::new(catalog));

        let result = orchestrator.generate_initial_scene("w", &[]).await;
        assert!(!result.is_ai_generated);
        assert!(result.tags.contains("western"));
        assert_eq!(result.metadata.theme, "western");
        assert_eq!(result.metadata.fallback_theme.as_deref(), Some(GENERIC_THEME));
    }

    #[tokio::test]
    async fn test_selector_is_reachable_for_tuning() {
        let generator = Arc::new(ScriptedGenerator::always_failing("network down"));
        let mut orchestrator = GenerationOrchestrator::new(generator, selector());

        orchestrator.generate_segment(forest_request()).await;
        assert_eq!(orchestrator.selector().usage_history().len(), 1);
        orchestrator.selector_mut().clear_usage_history();
        assert!(orchestrator.selector().usage_history().is_empty());

        let tier = orchestrator
            .selector_mut()
            .select("fantasy", SegmentKind::Scene, &BTreeSet::new())
            .map(|s| s.tier);
        assert_eq!(tier, Some(SelectionTier::Themed));
    }
}
