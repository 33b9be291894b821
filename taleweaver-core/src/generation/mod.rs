//! Narrative generation with retries and curated fallback.
//!
//! A [`NarrativeGenerator`] produces text for a [`GenerationRequest`]. The
//! [`GenerationOrchestrator`] wraps one, retries transient failures, and
//! falls back to curated content so every request yields a usable result.

mod anthropic;
mod backoff;
mod orchestrator;
pub mod prompt;
mod types;
mod world;

pub use anthropic::{parse_generated, ClaudeGenerator};
pub use backoff::Backoff;
pub use orchestrator::{GenerationOrchestrator, OrchestratorConfig, MINIMAL_FALLBACK_TEXT};
pub use types::{
    AttemptOutcome, GenerationAttempt, GenerationContext, GenerationMetadata,
    GenerationParameters, GenerationRequest, GenerationResult, DEFAULT_MAX_LENGTH,
};
pub use world::{CharacterView, InMemoryCatalog, WorldCatalog, WorldView};

use crate::segment::Choice;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single generation attempt.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Claude(#[from] claude::Error),

    #[error("Generator returned empty content")]
    EmptyContent,

    #[error("{0}")]
    Failed(String),
}

/// Raw output of a generator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedContent {
    pub text: String,
    pub choices: Vec<Choice>,
}

impl GeneratedContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }
}

/// External source of narrative text.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GeneratedContent, GeneratorError>;
}
