//! Failure classification shared by generation and persistence.
//!
//! External collaborators give no structured error contract, so failures
//! are classified from their message text. The same input always yields
//! the same classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a failed external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    ServiceUnavailable,
    Auth,
    Unknown,
}

impl ErrorKind {
    /// Wire name of the kind, e.g. `"service_unavailable"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Auth => "auth",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether failures of this kind are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Auth)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
}

impl Classification {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
        }
    }
}

/// Patterns checked in order; the first kind with a matching pattern wins.
const PATTERNS: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::Timeout, &["timeout", "timed out"]),
    (ErrorKind::Network, &["network", "connection"]),
    (
        ErrorKind::RateLimit,
        &["429", "rate limit", "rate-limit", "too many requests"],
    ),
    (
        ErrorKind::Auth,
        &["401", "unauthorized", "403", "forbidden", "invalid api key"],
    ),
    (
        ErrorKind::ServiceUnavailable,
        &[
            "503",
            "502",
            "529",
            "service unavailable",
            "overloaded",
            "bad gateway",
        ],
    ),
];

/// Classify a raw error message.
pub fn classify(message: &str) -> Classification {
    let normalized = message.to_lowercase();

    let kind = PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| normalized.contains(p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown);

    Classification::of(kind)
}

/// Classify an error together with every error in its `source()` chain.
///
/// Wrapped errors often carry the useful text ("connection reset") only in
/// an inner source, so the whole chain is joined before matching.
pub fn classify_error(error: &(dyn std::error::Error + 'static)) -> Classification {
    classify(&error_chain_message(error))
}

/// Join an error and its sources into a single `a: b: c` message.
pub fn error_chain_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
