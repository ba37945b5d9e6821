//! Complexity scoring and categorization of rules.
//!
//! A rule that failed validation is `Invalid`. Otherwise its complexity score
//! places it in `TooTrivial`, `Acceptable` or `TooComplex` using two
//! configurable thresholds. Classification is a pure function of the rule
//! text, its validation result and the configuration.

mod features;

use log::debug;
use serde::{Deserialize, Serialize};

use yarasmith_core::{ComplexityScore, RuleCategory, ValidationResult};

pub use features::RuleFeatures;

/// Literals shorter than this do not contribute to the score.
pub const MIN_SCORED_LITERAL_LEN: usize = 5;

/// Bonus factor for conditions requiring every string.
const ALL_OF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Scores below this are too trivial.
    pub low: f64,
    /// Scores above this are too complex.
    pub high: f64,
    /// Score added per condition clause beyond the first.
    pub clause_weight: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            low: 100.0,
            high: 5000.0,
            clause_weight: 10.0,
        }
    }
}

pub fn score(features: &RuleFeatures, config: &ClassifierConfig) -> ComplexityScore {
    let literal_score: f64 = features
        .strings
        .iter()
        .filter(|s| s.value.chars().count() >= MIN_SCORED_LITERAL_LEN)
        .map(|s| s.value.chars().count() as f64 * RuleFeatures::literal_weight(s.kind))
        .sum();

    let clause_score = config.clause_weight * features.condition_clauses.saturating_sub(1) as f64;

    let mut total = literal_score + clause_score;
    if features.uses_all_of && features.strings.len() > 1 {
        total *= ALL_OF_FACTOR;
    }

    ComplexityScore(total)
}

/// Score the rule text directly.
pub fn score_rule(rule_id: &str, rule_text: &str, config: &ClassifierConfig) -> ComplexityScore {
    score(&RuleFeatures::from_text(rule_id, rule_text), config)
}

/// Category of a rule after its correction loop ended.
pub fn classify(
    rule_text: &str,
    result: &ValidationResult,
    config: &ClassifierConfig,
) -> (RuleCategory, ComplexityScore) {
    if !result.is_syntax_valid {
        return (RuleCategory::Invalid, ComplexityScore::default());
    }

    let features = RuleFeatures::from_text(&result.descriptor_id, rule_text);
    let score = score(&features, config);

    if let Some(indicator) = features.weak_indicator {
        debug!(
            "Rule {} relies on weak indicator {}",
            result.descriptor_id, indicator
        );
        return (RuleCategory::TooTrivial, score);
    }

    let category = if score.value() < config.low {
        RuleCategory::TooTrivial
    } else if score.value() <= config.high {
        RuleCategory::Acceptable
    } else {
        RuleCategory::TooComplex
    };

    debug!(
        "Rule {} scored {} -> {}",
        result.descriptor_id, score, category
    );
    (category, score)
}
