//! Fixed-window admission control for outbound generation requests.
//!
//! The external generation service is costly and quota-limited, so each
//! client identifier (typically an IP address extracted by the caller) gets
//! a fixed budget of requests per window.

use crate::config::env_parse;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Chance that a `check_limit` call also sweeps expired windows.
const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

/// Errors from constructing a rate limiter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

/// Limiter settings.
///
/// The two profiles differ only in their numbers; behavior is identical.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Length of one window.
    pub window: Duration,

    /// Probability in `[0, 1]` that a call sweeps expired entries.
    pub sweep_probability: f64,
}

impl RateLimitConfig {
    /// Generous limits for local development and tests.
    pub fn lenient() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
        }
    }

    /// Production limits protecting the upstream quota.
    pub fn strict() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
        }
    }

    /// Build a config from `TALEWEAVER_RATE_LIMIT_*` environment variables.
    ///
    /// `TALEWEAVER_RATE_LIMIT_PROFILE=strict` selects the production profile
    /// (anything else is lenient); `TALEWEAVER_RATE_LIMIT_MAX` and
    /// `TALEWEAVER_RATE_LIMIT_WINDOW_SECS` override its numbers.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("TALEWEAVER_RATE_LIMIT_PROFILE") {
            Ok(profile) if profile.eq_ignore_ascii_case("strict") => Self::strict(),
            _ => Self::lenient(),
        };

        if let Some(max) = env_parse::<u32>("TALEWEAVER_RATE_LIMIT_MAX") {
            config.max_requests = max;
        }
        if let Some(secs) = env_parse::<u64>("TALEWEAVER_RATE_LIMIT_WINDOW_SECS") {
            config.window = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_sweep_probability(mut self, probability: f64) -> Self {
        self.sweep_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::lenient()
    }
}

/// Outcome of a `check_limit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Requests left in the current window.
    pub remaining: u32,

    /// When the current window ends.
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter keyed by client identifier.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: ChronoDuration,
    sweep_probability: f64,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window`.
    ///
    /// Both values must be non-zero.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        Self::with_config(
            RateLimitConfig::default()
                .with_max_requests(max_requests)
                .with_window(window),
        )
    }

    /// Create a limiter from a full config.
    pub fn with_config(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        if config.max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.sweep_probability) {
            return Err(RateLimitError::InvalidConfig(
                "sweep_probability must be within [0, 1]".to_string(),
            ));
        }
        if config.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        let window = ChronoDuration::from_std(config.window)
            .map_err(|e| RateLimitError::InvalidConfig(format!("window out of range: {e}")))?;

        Ok(Self {
            max_requests: config.max_requests,
            window,
            sweep_probability: config.sweep_probability,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Check and count a request for `identifier` at the current time.
    pub fn check_limit(&self, identifier: &str) -> RateLimitDecision {
        self.check_limit_at(identifier, Utc::now())
    }

    /// Check and count a request for `identifier` at `now`.
    pub fn check_limit_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut windows = self.lock();

        if self.sweep_probability > 0.0 && rand::thread_rng().gen_bool(self.sweep_probability) {
            Self::sweep(&mut windows, self.window, now);
        }

        let window = windows
            .entry(identifier.to_string())
            .or_insert(Window { start: now, count: 0 });

        if window.count == 0 || now - window.start > self.window {
            *window = Window { start: now, count: 1 };
            return RateLimitDecision {
                allowed: true,
                remaining: self.max_requests - 1,
                reset_time: now + self.window,
            };
        }

        let reset_time = window.start + self.window;

        if window.count >= self.max_requests {
            debug!(identifier, count = window.count, "rate limit reached");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_time,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - window.count,
            reset_time,
        }
    }

    /// Drop every window that has expired at `now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.lock();
        Self::sweep(&mut windows, self.window, now)
    }

    /// Number of identifiers currently tracked.
    pub fn tracked_identifiers(&self) -> usize {
        self.lock().len()
    }

    /// Human-readable retry hint for a refused request.
    pub fn error_message(reset_time: DateTime<Utc>) -> String {
        Self::error_message_at(reset_time, Utc::now())
    }

    /// Retry hint relative to `now`.
    pub fn error_message_at(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let remaining_ms = (reset_time - now).num_milliseconds().max(0);
        let minutes = (remaining_ms + 59_999) / 60_000;

        let when = if minutes <= 1 {
            "in a minute".to_string()
        } else if minutes <= 60 {
            format!("in {minutes} minutes")
        } else {
            let hours = (minutes + 59) / 60;
            format!("in {hours} hours")
        };

        format!("Too many story requests. Please try again {when}.")
    }

    fn sweep(
        windows: &mut HashMap<String, Window>,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> usize {
        let before = windows.len();
        windows.retain(|_, w| now - w.start <= window);
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, "swept expired rate limit windows");
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Window>> {
        // Windows are replaced wholesale, so a poisoned map is still consistent.
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
