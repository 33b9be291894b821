//! Testing utilities.
//!
//! This module provides deterministic stand-ins for the injected
//! collaborators:
//! - `ScriptedGenerator` replays scripted generator outcomes
//! - `RecordingSink` records persisted snapshots and can fail or block
//! - `GatedProvider` blocks captures until released
//! - `TestHarness` wires them into a [`StorySession`]
//! - Assertion helpers for generation results and save status

use crate::classify::ErrorKind;
use crate::fallback::FallbackLibrary;
use crate::generation::{
    GeneratedContent, GenerationRequest, GenerationResult, GeneratorError, NarrativeGenerator,
};
use crate::save::{
    GameStateSnapshot, PersistenceSink, SaveError, SaveState, SaveStatus, SaveTrigger,
    SnapshotProvider,
};
use crate::session::{SessionConfig, StorySession};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Semaphore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Generator
// ============================================================================

/// One scripted generator call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Content(GeneratedContent),
    /// Fail with this message; it is classified like any other error.
    Fail(String),
    /// Never complete. Pair with an attempt timeout.
    Hang,
}

/// A generator that returns scripted outcomes in order.
///
/// Once the script runs out every call gets the fallthrough outcome.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallthrough: ScriptedOutcome,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallthrough: ScriptedOutcome::Content(GeneratedContent::text(
                "The narrator has no more scripted lines.",
            )),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with `message`.
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallthrough(ScriptedOutcome::Fail(message.into()))
    }

    /// Fails `times` calls with `message`, then returns `text`.
    pub fn failing_then(times: usize, message: &str, text: &str) -> Self {
        let mut outcomes: Vec<ScriptedOutcome> = (0..times)
            .map(|_| ScriptedOutcome::Fail(message.to_string()))
            .collect();
        outcomes.push(ScriptedOutcome::Content(GeneratedContent::text(text)));
        Self::new(outcomes)
    }

    pub fn with_fallthrough(mut self, outcome: ScriptedOutcome) -> Self {
        self.fallthrough = outcome;
        self
    }

    /// Queue another outcome.
    pub fn push(&self, outcome: ScriptedOutcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.fallthrough.clone());

        match outcome {
            ScriptedOutcome::Content(content) => Ok(content),
            ScriptedOutcome::Fail(message) => Err(GeneratorError::Failed(message)),
            ScriptedOutcome::Hang => futures::future::pending().await,
        }
    }
}

// ============================================================================
// Save collaborators
// ============================================================================

struct SinkState<S> {
    persisted: Mutex<Vec<(S, SaveTrigger)>>,
    failures: Mutex<VecDeque<String>>,
    gate: Option<Semaphore>,
    started: watch::Sender<usize>,
}

/// A sink that keeps every persisted snapshot in memory.
pub struct RecordingSink<S> {
    state: Arc<SinkState<S>>,
}

impl<S> Clone for RecordingSink<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: Clone> Default for RecordingSink<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone> RecordingSink<S> {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Each persist blocks until [`release`](Self::release) grants it a permit.
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        let (started, _) = watch::channel(0);
        Self {
            state: Arc::new(SinkState {
                persisted: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                gate,
                started,
            }),
        }
    }

    /// Make the next persist fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.state.failures).push_back(message.into());
    }

    /// Let `permits` blocked persists through.
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(permits);
        }
    }

    /// Wait until at least one persist has started.
    pub async fn wait_for_persist(&self) {
        let mut rx = self.state.started.subscribe();
        let _ = rx.wait_for(|n| *n > 0).await;
    }

    /// Snapshots persisted successfully, with their triggers.
    pub fn persisted(&self) -> Vec<(S, SaveTrigger)> {
        lock(&self.state.persisted).clone()
    }
}

#[async_trait]
impl<S> PersistenceSink<S> for RecordingSink<S>
where
    S: Clone + Send + Sync,
{
    async fn persist(&self, snapshot: &S, trigger: SaveTrigger) -> Result<(), SaveError> {
        self.state.started.send_modify(|n| *n += 1);

        if let Some(gate) = &self.state.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(message) = lock(&self.state.failures).pop_front() {
            return Err(SaveError::Persist(message));
        }

        lock(&self.state.persisted).push((snapshot.clone(), trigger));
        Ok(())
    }
}

struct ProviderState<S> {
    snapshot: S,
    gate: Semaphore,
    started: watch::Sender<usize>,
}

/// A provider whose captures block until released.
pub struct GatedProvider<S> {
    state: Arc<ProviderState<S>>,
}

impl<S> Clone for GatedProvider<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: Clone> GatedProvider<S> {
    pub fn new(snapshot: S) -> Self {
        let (started, _) = watch::channel(0);
        Self {
            state: Arc::new(ProviderState {
                snapshot,
                gate: Semaphore::new(0),
                started,
            }),
        }
    }

    /// Let `permits` blocked captures complete.
    pub fn release(&self, permits: usize) {
        self.state.gate.add_permits(permits);
    }

    /// Wait until at least one capture has started.
    pub async fn wait_for_capture(&self) {
        let mut rx = self.state.started.subscribe();
        let _ = rx.wait_for(|n| *n > 0).await;
    }

    /// Captures started so far.
    pub fn captures(&self) -> usize {
        *self.state.started.borrow()
    }
}

#[async_trait]
impl<S> SnapshotProvider<S> for GatedProvider<S>
where
    S: Clone + Send + Sync,
{
    async fn capture(&self) -> Result<S, SaveError> {
        self.state.started.send_modify(|n| *n += 1);
        if let Ok(permit) = self.state.gate.acquire().await {
            permit.forget();
        }
        Ok(self.state.snapshot.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A story session wired to a scripted generator and a recording sink.
pub struct TestHarness {
    pub session: StorySession,
    pub generator: Arc<ScriptedGenerator>,
    pub sink: RecordingSink<GameStateSnapshot>,
}

impl TestHarness {
    /// Harness over the built-in fallback library.
    pub fn new(generator: ScriptedGenerator) -> Result<Self, crate::fallback::LibraryError> {
        Ok(Self::with_library(generator, FallbackLibrary::builtin()?))
    }

    pub fn with_library(generator: ScriptedGenerator, library: FallbackLibrary) -> Self {
        let generator = Arc::new(generator);
        let sink = RecordingSink::new();
        let session = StorySession::new(
            generator.clone(),
            library,
            Arc::new(sink.clone()),
            SessionConfig::new(),
        );
        Self {
            session,
            generator,
            sink,
        }
    }

    /// Wait for background saves, then return the persisted snapshots.
    pub async fn settled_saves(&self) -> Vec<(GameStateSnapshot, SaveTrigger)> {
        self.session.saves().wait_idle().await;
        self.sink.persisted()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that a result came from the generator.
#[track_caller]
pub fn assert_ai_generated(result: &GenerationResult) {
    assert!(
        result.is_ai_generated,
        "Expected AI content, got fallback ({:?})",
        result.fallback_reason
    );
    assert!(result.fallback_reason.is_none());
}

/// Assert that a result is fallback content for the given reason.
#[track_caller]
pub fn assert_fallback(result: &GenerationResult, reason: ErrorKind) {
    assert!(!result.is_ai_generated, "Expected fallback content");
    assert_eq!(
        result.fallback_reason,
        Some(reason),
        "Expected fallback reason {reason}"
    );
    assert!(!result.content.trim().is_empty(), "Fallback content is empty");
}

/// Assert that a result offers at least one choice.
#[track_caller]
pub fn assert_has_choices(result: &GenerationResult) {
    let count = result.choices.as_ref().map_or(0, Vec::len);
    assert!(count > 0, "Expected choices, got none");
}

/// Assert that a result is tagged with `tag`.
#[track_caller]
pub fn assert_tagged(result: &GenerationResult, tag: &str) {
    assert!(
        result.tags.contains(tag),
        "Expected tag '{tag}', got {:?}",
        result.tags
    );
}

/// Assert that the last save succeeded and `total` saves have completed.
#[track_caller]
pub fn assert_saved(status: &SaveStatus, total: u64) {
    assert_eq!(
        status.state,
        SaveState::Saved,
        "Expected saved state, got {:?} ({:?})",
        status.state,
        status.error
    );
    assert_eq!(status.total_saves, total, "Expected {total} saves");
}
