//! Partial results produced by workers and merged by the coordinator.

use yarasmith_core::{CandidateRule, ComplexityScore, RegexCandidate, RuleCategory, StringCluster, ValidationResult};
use yarasmith_reports::{AcceptedRegex, RejectedRegex, RunSummary, SkipEntry};

/// A rule after its correction loop and classification.
#[derive(Debug, Clone)]
pub struct ClassifiedRule {
    pub rule: CandidateRule,
    pub result: ValidationResult,
    pub category: RuleCategory,
    pub score: ComplexityScore,
}

#[derive(Debug, Default)]
pub struct CategoryAccumulator {
    pub rules: Vec<ClassifiedRule>,
    pub skipped: Vec<SkipEntry>,
}

impl CategoryAccumulator {
    pub fn record(
        &mut self,
        rule: CandidateRule,
        result: ValidationResult,
        category: RuleCategory,
        score: ComplexityScore,
    ) {
        self.rules.push(ClassifiedRule {
            rule,
            result,
            category,
            score,
        });
    }

    pub fn skip(&mut self, stage: &str, id: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkipEntry {
            stage: stage.to_string(),
            id: id.into(),
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: CategoryAccumulator) {
        self.rules.extend(other.rules);
        self.skipped.extend(other.skipped);
    }

    pub fn summarize(&self, summary: &mut RunSummary) {
        for classified in &self.rules {
            summary.record_category(classified.category, classified.result.failure);
        }
        summary.skipped.extend(self.skipped.iter().cloned());
    }
}

#[derive(Debug, Default)]
pub struct RegexAccumulator {
    pub accepted: Vec<AcceptedRegex>,
    pub rejected: Vec<RejectedRegex>,
    pub skipped: Vec<SkipEntry>,
}

impl RegexAccumulator {
    pub fn accept(&mut self, cluster: &StringCluster, candidate: &RegexCandidate) {
        self.accepted.push(AcceptedRegex::new(cluster, candidate));
    }

    pub fn reject(&mut self, cluster: &StringCluster, candidate: &RegexCandidate) {
        if let Some(rejected) = RejectedRegex::new(cluster, candidate) {
            self.rejected.push(rejected);
        }
    }

    pub fn skip(&mut self, stage: &str, id: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkipEntry {
            stage: stage.to_string(),
            id: id.into(),
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: RegexAccumulator) {
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
        self.skipped.extend(other.skipped);
    }

    /// Records sorted by cluster id, so store files do not depend on
    /// completion order.
    pub fn sort(&mut self) {
        self.accepted.sort_by_key(|r| r.cluster_id);
        self.rejected.sort_by_key(|r| r.cluster_id);
    }

    pub fn patterns(&self) -> Vec<String> {
        self.accepted.iter().map(|r| r.pattern.clone()).collect()
    }

    pub fn summarize(&self, summary: &mut RunSummary) {
        summary.regex_accepted += self.accepted.len();
        for rejected in &self.rejected {
            summary.record_rejection(&rejected.reason);
        }
        summary.skipped.extend(self.skipped.iter().cloned());
    }
}
