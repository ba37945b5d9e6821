//! Error types shared across pipeline stages.

use thiserror::Error;

/// Failure of an external text service (generation, correction, patterns).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Timeouts, rate limiting, connection resets. Worth retrying.
    #[error("transient service error: {0}")]
    Transient(String),

    /// Malformed request, authentication failure. Retrying cannot help.
    #[error("permanent service error: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// The syntax checker itself could not be run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax checker unavailable: {0}")]
pub struct CheckerUnavailable(pub String);

/// Rule text that passed syntax validation but cannot be parsed for strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed rule {rule_id}: {reason}")]
pub struct MalformedRule {
    pub rule_id: String,
    pub reason: String,
}

impl MalformedRule {
    pub fn new(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }
}
