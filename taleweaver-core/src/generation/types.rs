//! Requests, attempts, and results of narrative generation.

use crate::classify::ErrorKind;
use crate::segment::{normalize_tags, normalize_theme, Choice, SegmentKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default upper bound on generated text length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 1200;

/// Story context for one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Theme or genre of the world, normalized.
    pub theme: String,

    /// Free-form context tags, normalized.
    pub tags: BTreeSet<String>,

    /// Most recent segments, oldest first.
    pub recent_segments: Vec<String>,

    pub session_id: Option<String>,
    pub world_id: Option<String>,
    pub character_ids: Vec<String>,

    /// Extra lines for the prompt (world description, character sketches).
    pub notes: Vec<String>,
}

impl GenerationContext {
    pub fn new(theme: &str) -> Self {
        Self {
            theme: normalize_theme(theme),
            tags: BTreeSet::new(),
            recent_segments: Vec::new(),
            session_id: None,
            world_id: None,
            character_ids: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.tags.extend(normalize_tags(tags));
        self
    }

    pub fn with_recent_segments(mut self, segments: Vec<String>) -> Self {
        self.recent_segments = segments;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_world(mut self, world_id: impl Into<String>) -> Self {
        self.world_id = Some(world_id.into());
        self
    }

    pub fn with_characters(mut self, character_ids: Vec<String>) -> Self {
        self.character_ids = character_ids;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Knobs for a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Upper bound on content length, in characters.
    pub max_length: usize,

    /// Whether the result must offer player choices.
    pub include_choices: bool,

    pub temperature: Option<f32>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            include_choices: false,
            temperature: None,
        }
    }
}

/// A request for one narrative beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub segment_kind: SegmentKind,
    pub context: GenerationContext,
    pub parameters: GenerationParameters,
}

impl GenerationRequest {
    pub fn new(segment_kind: SegmentKind, context: GenerationContext) -> Self {
        Self {
            segment_kind,
            context,
            parameters: GenerationParameters::default(),
        }
    }

    /// Require player choices in the result.
    pub fn with_choices(mut self) -> Self {
        self.parameters.include_choices = true;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.parameters.max_length = max_length;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.parameters.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { kind: ErrorKind, message: String },
}

/// Record of one call to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// 0 for the first attempt.
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl GenerationAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded)
    }
}

/// Bookkeeping attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Retries actually performed (0 when the first attempt succeeded).
    pub retry_attempts: u32,

    /// Every attempt, in order.
    pub attempts: Vec<GenerationAttempt>,

    /// Theme that was requested.
    pub theme: String,

    /// Curated entry served on the fallback path.
    pub fallback_entry_id: Option<String>,

    /// Library bucket the fallback entry came from, when it differs from
    /// `theme` (e.g. the generic bucket for an uncurated theme).
    #[serde(default)]
    pub fallback_theme: Option<String>,

    pub generated_at: DateTime<Utc>,
}

/// A delivered narrative beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub is_ai_generated: bool,

    /// Why fallback content was used; `None` for AI content.
    pub fallback_reason: Option<ErrorKind>,

    pub segment_kind: SegmentKind,

    /// Tags that describe the delivered content.
    pub tags: BTreeSet<String>,

    pub choices: Option<Vec<Choice>>,
    pub metadata: GenerationMetadata,
}

impl GenerationResult {
    /// Whether curated content (or the minimal text) was used.
    pub fn is_fallback(&self) -> bool {
        !self.is_ai_generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new(
            SegmentKind::Scene,
            GenerationContext::new("Fantasy")
                .with_tags(["Forest", "day"])
                .with_session("s-1")
                .with_world("w-1"),
        )
        .with_choices()
        .with_max_length(400)
        .with_temperature(1.7);

        assert_eq!(request.context.theme, "fantasy");
        assert!(request.context.tags.contains("forest"));
        assert!(request.parameters.include_choices);
        assert_eq!(request.parameters.max_length, 400);
        assert_eq!(request.parameters.temperature, Some(1.0));
    }

    #[test]
    fn test_attempt_outcome_serializes_with_kind() {
        let outcome = AttemptOutcome::Failed {
            kind: ErrorKind::Timeout,
            message: "timed out".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "timeout");
    }
}
