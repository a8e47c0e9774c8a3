//! Switchboard error types

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::routing::TaskCategory;

/// Switchboard error types
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    // Configuration errors (never retried)
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    // Routing outcomes
    /// No candidate satisfies the hard requirements, even after relaxation.
    #[error("no suitable provider for task '{task}' ({} excluded)", .exclusions.len())]
    NoSuitableProvider {
        task: TaskCategory,
        exclusions: Vec<Exclusion>,
    },

    /// Every attempt failed, or the attempt budget was spent.
    #[error("all providers failed after {} attempt(s): {}", .attempts.len(), AttemptTrail(.attempts))]
    Exhausted { attempts: Vec<AttemptFailure> },

    /// The caller abandoned the request or its deadline passed.
    #[error("request cancelled")]
    Cancelled,

    // Provider/network errors (one attempt)
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: usize },

    #[error("provider does not support {0}")]
    Unsupported(&'static str),
}

impl SwitchboardError {
    /// Whether a failed attempt is worth trying again (transient) as opposed
    /// to a fault in the request or credentials (permanent).
    pub fn is_transient(&self) -> bool {
        match self {
            SwitchboardError::Timeout(_)
            | SwitchboardError::Http(_)
            | SwitchboardError::RateLimited { .. }
            | SwitchboardError::Stream(_)
            | SwitchboardError::EmptyResponse => true,
            SwitchboardError::Api { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// Provider-supplied back-off hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SwitchboardError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Adapter contract classification of a failed attempt.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }
}

/// Classification of a single failed dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, rate limits, 5xx, dropped connections.
    Transient,
    /// Bad credentials, unknown model, malformed request.
    Permanent,
}

/// One failed dispatch attempt, kept in the fallback trail.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub model: String,
    pub kind: FailureKind,
    pub reason: String,
    pub elapsed_ms: u64,
}

impl AttemptFailure {
    pub(crate) fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        error: &SwitchboardError,
        elapsed: Duration,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind: error.failure_kind(),
            reason: error.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// A provider dropped from the candidate set, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub provider: String,
    pub reason: String,
}

impl Exclusion {
    pub(crate) fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

struct AttemptTrail<'a>(&'a [AttemptFailure]);

impl fmt::Display for AttemptTrail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attempt) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} ({})", attempt.provider, attempt.reason)?;
        }
        Ok(())
    }
}

/// Result type alias for Switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;
