//! Core types and error definitions for yarasmith.
//!
//! This crate provides the data model shared by every pipeline stage:
//! - Threat descriptors and candidate rules
//! - Validation results and rule categories
//! - Extracted strings, clusters and regex candidates
//! - Service and parsing error types
//! - Rule-text helpers (rule block extraction, placeholder detection)
//! - A scanner for string definitions and conditions

mod cluster;
mod descriptor;
mod error;
mod regex_candidate;
mod rule;
pub mod rule_syntax;
pub mod rule_text;

pub use cluster::{CharsetClass, ExtractedString, LengthClass, StringCluster};
pub use descriptor::ThreatDescriptor;
pub use error::{CheckerUnavailable, MalformedRule, ServiceError};
pub use regex_candidate::{RegexCandidate, RejectionReason};
pub use rule::{CandidateRule, ComplexityScore, FailureReason, RuleCategory, ValidationResult};
