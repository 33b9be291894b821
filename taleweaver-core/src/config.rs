//! Environment-driven configuration.

use crate::fallback::SelectorConfig;
use crate::generation::OrchestratorConfig;
use crate::rate_limit::RateLimitConfig;
use crate::save::SaveConfig;
use std::str::FromStr;
use std::time::Duration;

/// Every tunable of the core in one place.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub orchestrator: OrchestratorConfig,
    pub save: SaveConfig,
    pub selector: SelectorConfig,
    pub rate_limit: RateLimitConfig,
}

impl CoreConfig {
    /// Defaults overridden by `TALEWEAVER_*` environment variables.
    ///
    /// - `TALEWEAVER_MAX_RETRIES`: retries after the first generation attempt
    /// - `TALEWEAVER_ATTEMPT_TIMEOUT_SECS`: per-attempt time limit
    /// - `TALEWEAVER_AUTOSAVE_SECS`: autosave interval (0 disables autosave)
    /// - `TALEWEAVER_HISTORY_CAPACITY`: fallback entries kept out of rotation
    /// - `TALEWEAVER_RATE_LIMIT_*`: see [`RateLimitConfig::from_env`]
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self {
            rate_limit: RateLimitConfig::from_env(),
            ..Self::default()
        };

        if let Some(retries) = env_parse::<u32>("TALEWEAVER_MAX_RETRIES") {
            config.orchestrator.max_retries = retries;
        }
        if let Some(secs) = env_parse::<u64>("TALEWEAVER_ATTEMPT_TIMEOUT_SECS") {
            config.orchestrator.attempt_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse::<u64>("TALEWEAVER_AUTOSAVE_SECS") {
            if secs == 0 {
                config.save.enabled = false;
            } else {
                config.save.interval = Duration::from_secs(secs);
            }
        }
        if let Some(capacity) = env_parse::<usize>("TALEWEAVER_HISTORY_CAPACITY") {
            config.selector.history_capacity = capacity;
        }
        config
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
