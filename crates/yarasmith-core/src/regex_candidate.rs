//! Regex candidates produced for clusters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a synthesized pattern was discarded by the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    CompileFailure(String),
    MissesMember(String),
    OutOfBounds(String),
    DenylistMatch(String),
}

impl RejectionReason {
    /// Stable label used for summary counts.
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::CompileFailure(_) => "compile failure",
            RejectionReason::MissesMember(_) => "misses cluster member",
            RejectionReason::OutOfBounds(_) => "complexity out of bounds",
            RejectionReason::DenylistMatch(_) => "denylist match",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::CompileFailure(detail)
            | RejectionReason::MissesMember(detail)
            | RejectionReason::OutOfBounds(detail)
            | RejectionReason::DenylistMatch(detail) => write!(f, "{}: {}", self.label(), detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexCandidate {
    pub cluster_id: usize,
    pub pattern: String,
    pub attempt: u32,
    pub passes_filter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReason>,
}

impl RegexCandidate {
    /// A freshly synthesized candidate that has not been filtered yet.
    pub fn new(cluster_id: usize, pattern: impl Into<String>, attempt: u32) -> Self {
        Self {
            cluster_id,
            pattern: pattern.into(),
            attempt,
            passes_filter: false,
            rejection: None,
        }
    }

    pub fn accept(mut self) -> Self {
        self.passes_filter = true;
        self.rejection = None;
        self
    }

    pub fn reject(mut self, reason: RejectionReason) -> Self {
        self.passes_filter = false;
        self.rejection = Some(reason);
        self
    }
}
