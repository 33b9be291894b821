//! [`NarrativeGenerator`] backed by the Claude Messages API.

use super::prompt::{system_prompt, user_prompt};
use super::{GeneratedContent, GenerationRequest, GeneratorError, NarrativeGenerator};
use crate::segment::Choice;
use ::claude::{Claude, Message, Request};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Rough characters-per-token ratio used to size `max_tokens`.
const CHARS_PER_TOKEN: usize = 3;
const MIN_MAX_TOKENS: usize = 256;

/// Generates narrative through Claude.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    default_temperature: f32,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            default_temperature: 0.8,
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, GeneratorError> {
        Ok(Self::new(Claude::from_env()?))
    }

    /// Build from `ANTHROPIC_API_KEY` with a per-request HTTP timeout.
    pub fn from_env_with_timeout(timeout: Duration) -> Result<Self, GeneratorError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| ::claude::Error::NoApiKey)?;
        Ok(Self::new(Claude::with_timeout(api_key, timeout)?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    fn build_request(&self, request: &GenerationRequest) -> Request {
        let max_tokens = (request.parameters.max_length / CHARS_PER_TOKEN).max(MIN_MAX_TOKENS);
        Request::new(vec![Message::user(user_prompt(request))])
            .with_system(system_prompt(request))
            .with_max_tokens(max_tokens)
            .with_temperature(
                request
                    .parameters
                    .temperature
                    .unwrap_or(self.default_temperature),
            )
    }
}

#[async_trait]
impl NarrativeGenerator for ClaudeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, GeneratorError> {
        let response = self.client.complete(self.build_request(request)).await?;
        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "claude response received"
        );
        Ok(parse_generated(&response.text))
    }
}

#[derive(Deserialize)]
struct RawSegment {
    content: String,
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Parse model output.
///
/// Expects a JSON object `{"content": ..., "choices": [...]}`, possibly
/// wrapped in a code fence or surrounded by prose. Anything else is taken as
/// plain narration without choices.
pub fn parse_generated(raw: &str) -> GeneratedContent {
    let trimmed = raw.trim();
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return GeneratedContent::text(trimmed),
    };

    match serde_json::from_str::<RawSegment>(json) {
        Ok(segment) => GeneratedContent {
            text: segment.content.trim().to_string(),
            choices: segment
                .choices
                .into_iter()
                .filter(|c| !c.text.trim().is_empty())
                .collect(),
        },
        Err(_) => GeneratedContent::text(trimmed),
    }
}
