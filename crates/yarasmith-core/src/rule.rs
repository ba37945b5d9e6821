//! Candidate rules, validation results and categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generated rule text travelling through the correction loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRule {
    pub descriptor_id: String,
    pub text: String,
    /// Number of texts this rule has carried (1 for the generated text).
    pub attempts: u32,
}

impl CandidateRule {
    pub fn new(descriptor_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            descriptor_id: descriptor_id.into(),
            text: text.into(),
            attempts: 1,
        }
    }

    /// Replace the rule text with a corrected revision.
    pub fn revise(&mut self, text: String) {
        self.text = text;
        self.attempts += 1;
    }
}

/// Why a rule ended the correction loop without becoming valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CheckerUnreachable,
    AttemptsExhausted,
    NoProgress,
    UnacceptableCorrection,
    CorrectionUnavailable,
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::CheckerUnreachable => "checker unreachable",
            FailureReason::AttemptsExhausted => "attempts exhausted",
            FailureReason::NoProgress => "no progress",
            FailureReason::UnacceptableCorrection => "unacceptable correction",
            FailureReason::CorrectionUnavailable => "correction unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of validating (and possibly correcting) one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub descriptor_id: String,
    pub is_syntax_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub attempt_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl ValidationResult {
    pub fn valid(descriptor_id: impl Into<String>, attempt_number: u32) -> Self {
        Self {
            descriptor_id: descriptor_id.into(),
            is_syntax_valid: true,
            error_message: None,
            attempt_number,
            failure: None,
        }
    }

    pub fn failed(
        descriptor_id: impl Into<String>,
        attempt_number: u32,
        failure: FailureReason,
        error_message: Option<String>,
    ) -> Self {
        Self {
            descriptor_id: descriptor_id.into(),
            is_syntax_valid: false,
            error_message,
            attempt_number,
            failure: Some(failure),
        }
    }
}

/// The single bucket a rule ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Invalid,
    TooTrivial,
    Acceptable,
    TooComplex,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 4] = [
        RuleCategory::Invalid,
        RuleCategory::TooTrivial,
        RuleCategory::Acceptable,
        RuleCategory::TooComplex,
    ];

    /// Directory name of the bucket on disk.
    pub fn bucket_name(&self) -> &'static str {
        match self {
            RuleCategory::Invalid => "invalid",
            RuleCategory::TooTrivial => "too-trivial",
            RuleCategory::Acceptable => "acceptable",
            RuleCategory::TooComplex => "too-complex",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket_name())
    }
}

/// Structural complexity of a rule. Higher means more distinguishing content.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct ComplexityScore(pub f64);

impl ComplexityScore {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ComplexityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}
