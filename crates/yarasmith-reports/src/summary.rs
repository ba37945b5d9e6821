//! Run summary: where every input ended up.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use yarasmith_core::{FailureReason, RejectionReason, RuleCategory};

use crate::error::StoreError;

/// An input that did not reach a bucket or the regex store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub stage: String,
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated: usize,
    pub categories: BTreeMap<RuleCategory, usize>,
    pub invalid_reasons: BTreeMap<FailureReason, usize>,
    pub strings_extracted: usize,
    pub clusters: usize,
    pub clusters_discarded: usize,
    pub regex_accepted: usize,
    pub regex_rejections: BTreeMap<String, usize>,
    pub master_rules: usize,
    pub skipped: Vec<SkipEntry>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_category(&mut self, category: RuleCategory, failure: Option<FailureReason>) {
        *self.categories.entry(category).or_default() += 1;
        if let Some(reason) = failure {
            *self.invalid_reasons.entry(reason).or_default() += 1;
        }
    }

    pub fn record_rejection(&mut self, reason: &RejectionReason) {
        *self
            .regex_rejections
            .entry(reason.label().to_string())
            .or_default() += 1;
    }

    pub fn record_skip(&mut self, stage: &str, id: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkipEntry {
            stage: stage.to_string(),
            id: id.into(),
            reason: reason.into(),
        });
    }

    pub fn category_count(&self, category: RuleCategory) -> usize {
        self.categories.get(&category).copied().unwrap_or(0)
    }

    /// Rules that reached a bucket.
    pub fn classified(&self) -> usize {
        self.categories.values().sum()
    }

    pub fn skipped_in(&self, stage: &str) -> usize {
        self.skipped.iter().filter(|s| s.stage == stage).count()
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.generated += other.generated;
        for (category, count) in other.categories {
            *self.categories.entry(category).or_default() += count;
        }
        for (reason, count) in other.invalid_reasons {
            *self.invalid_reasons.entry(reason).or_default() += count;
        }
        self.strings_extracted += other.strings_extracted;
        self.clusters += other.clusters;
        self.clusters_discarded += other.clusters_discarded;
        self.regex_accepted += other.regex_accepted;
        for (label, count) in other.regex_rejections {
            *self.regex_rejections.entry(label).or_default() += count;
        }
        self.master_rules += other.master_rules;
        self.skipped.extend(other.skipped);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), StoreError> {
        let json = self.to_json().map_err(|source| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|e| StoreError::io(path, e))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary")?;
        if self.generated > 0 {
            writeln!(f, "  generated rules:     {}", self.generated)?;
        }
        if !self.categories.is_empty() {
            for category in RuleCategory::ALL {
                writeln!(f, "  {:<20} {}", format!("{}:", category), self.category_count(category))?;
            }
            for (reason, count) in &self.invalid_reasons {
                writeln!(f, "    invalid ({}): {}", reason, count)?;
            }
        }
        if self.strings_extracted > 0 || self.clusters > 0 {
            writeln!(f, "  strings extracted:   {}", self.strings_extracted)?;
            writeln!(
                f,
                "  clusters:            {} ({} below minimum size)",
                self.clusters, self.clusters_discarded
            )?;
            writeln!(f, "  regex accepted:      {}", self.regex_accepted)?;
            for (label, count) in &self.regex_rejections {
                writeln!(f, "    rejected ({}): {}", label, count)?;
            }
            writeln!(f, "  master rules:        {}", self.master_rules)?;
        }
        write!(f, "  skipped:             {}", self.skipped.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_merge() {
        let mut first = RunSummary::new();
        first.record_category(RuleCategory::Acceptable, None);
        first.record_category(RuleCategory::Invalid, Some(FailureReason::NoProgress));

        let mut second = RunSummary::new();
        second.record_category(RuleCategory::Invalid, Some(FailureReason::NoProgress));
        second.record_rejection(&RejectionReason::CompileFailure("x".to_string()));
        second.record_skip("extract", "exploit_3", "missing condition section");

        first.merge(second);

        assert_eq!(first.category_count(RuleCategory::Invalid), 2);
        assert_eq!(first.classified(), 3);
        assert_eq!(first.invalid_reasons[&FailureReason::NoProgress], 2);
        assert_eq!(first.regex_rejections["compile failure"], 1);
        assert_eq!(first.skipped_in("extract"), 1);
    }

    #[test]
    fn test_json_uses_readable_keys() {
        let mut summary = RunSummary::new();
        summary.record_category(RuleCategory::TooTrivial, None);
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"too_trivial\": 1"));
    }

    #[test]
    fn test_display_lists_buckets() {
        let mut summary = RunSummary::new();
        summary.record_category(RuleCategory::TooComplex, None);
        let text = summary.to_string();
        assert!(text.contains("too-complex:"));
        assert!(text.ends_with("skipped:             0"));
    }
}
