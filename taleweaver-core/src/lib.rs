//! Resilient narrative generation and session autosave for AI-driven
//! story games.
//!
//! This crate provides:
//! - Error classification into retryable and non-retryable kinds
//! - Per-client fixed-window rate limiting
//! - Curated, context-aware fallback content with repetition avoidance
//! - A generation orchestrator that retries, then falls back, and never fails
//! - Single-flight autosave with periodic and event-driven triggers
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use taleweaver_core::{
//!     ClaudeGenerator, FallbackLibrary, JsonFileSink, SegmentKind, SessionConfig, StorySession,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = Arc::new(ClaudeGenerator::from_env()?);
//!     let sink = Arc::new(JsonFileSink::new("saves/story_autosave.json"));
//!     let mut session =
//!         StorySession::new(generator, FallbackLibrary::builtin()?, sink, SessionConfig::new());
//!
//!     let opening = session.begin("eldoria", &[]).await?;
//!     println!("{}", opening.content);
//!
//!     let request = session.next_request(SegmentKind::Scene).with_choices();
//!     let scene = session.advance(request).await?;
//!     println!("{}", scene.content);
//!
//!     session.end().await?;
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod fallback;
pub mod generation;
pub mod rate_limit;
pub mod save;
pub mod segment;
pub mod session;
pub mod testing;

// Primary public API
pub use classify::{classify, classify_error, Classification, ErrorKind};
pub use config::CoreConfig;
pub use fallback::{FallbackContentSelector, FallbackEntry, FallbackLibrary, SelectorConfig};
pub use generation::{
    Backoff, ClaudeGenerator, GeneratedContent, GenerationContext, GenerationOrchestrator,
    GenerationRequest, GenerationResult, GeneratorError, InMemoryCatalog, NarrativeGenerator,
    OrchestratorConfig, WorldCatalog,
};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use save::{
    GameStateSnapshot, JsonFileSink, SaveConfig, SaveCoordinator, SaveState, SaveStatus,
    SaveTrigger, TriggerOutcome,
};
pub use segment::{Choice, SegmentKind};
pub use session::{SessionConfig, SessionError, SessionPhase, StorySession};
pub use testing::{RecordingSink, ScriptedGenerator, ScriptedOutcome, TestHarness};
