use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use yarasmith_core::{RegexCandidate, RejectionReason, StringCluster};

use crate::metrics::RegexMetrics;

/// Inclusive complexity bounds a pattern must stay within.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexBounds {
    pub min_length: usize,
    pub max_length: usize,
    pub max_quantifiers: usize,
    pub max_advanced_constructs: usize,
    pub max_escaped_characters: usize,
    pub max_classes_alternation: usize,
    pub max_wildcard_ratio: f64,
}

impl Default for RegexBounds {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 150,
            max_quantifiers: 3,
            max_advanced_constructs: 2,
            max_escaped_characters: 10,
            max_classes_alternation: 20,
            max_wildcard_ratio: 0.3,
        }
    }
}

impl RegexBounds {
    /// First bound the metrics violate, described for the rejection record.
    pub fn violation(&self, m: &RegexMetrics) -> Option<String> {
        if m.length < self.min_length || m.length > self.max_length {
            return Some(format!(
                "length {} outside [{}, {}]",
                m.length, self.min_length, self.max_length
            ));
        }
        if m.quantifiers > self.max_quantifiers {
            return Some(format!(
                "{} quantifiers exceed {}",
                m.quantifiers, self.max_quantifiers
            ));
        }
        if m.max_advanced_construct > self.max_advanced_constructs {
            return Some(format!(
                "advanced construct repeated {} times, limit {}",
                m.max_advanced_construct, self.max_advanced_constructs
            ));
        }
        if m.escaped_characters > self.max_escaped_characters {
            return Some(format!(
                "{} escaped characters exceed {}",
                m.escaped_characters, self.max_escaped_characters
            ));
        }
        if m.classes_and_alternations > self.max_classes_alternation {
            return Some(format!(
                "{} classes and alternations exceed {}",
                m.classes_and_alternations, self.max_classes_alternation
            ));
        }
        if m.wildcard_ratio > self.max_wildcard_ratio {
            return Some(format!(
                "wildcard ratio {:.2} exceeds {:.2}",
                m.wildcard_ratio, self.max_wildcard_ratio
            ));
        }
        None
    }
}

/// Benign samples a useful signature must not match. The empty string
/// catches patterns that match anything.
pub fn default_denylist() -> Vec<String> {
    [
        "",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        "Microsoft Corporation",
        "This program cannot be run in DOS mode.",
        "http://www.w3.org/2001/XMLSchema-instance",
        "C:\\Windows\\System32\\kernel32.dll",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Applies the four ordered checks to synthesized patterns.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    bounds: RegexBounds,
    denylist: Vec<String>,
}

impl Default for RegexFilter {
    fn default() -> Self {
        Self::new(RegexBounds::default(), default_denylist())
    }
}

impl RegexFilter {
    pub fn new(bounds: RegexBounds, denylist: Vec<String>) -> Self {
        Self { bounds, denylist }
    }

    pub fn bounds(&self) -> &RegexBounds {
        &self.bounds
    }

    /// Accept or reject a candidate: it must compile, match every member,
    /// stay within bounds, and match no denylisted sample.
    pub fn evaluate(&self, candidate: RegexCandidate, cluster: &StringCluster) -> RegexCandidate {
        match self.first_failure(&candidate.pattern, cluster) {
            Some(reason) => {
                debug!(
                    "Pattern for cluster {} rejected: {}",
                    candidate.cluster_id, reason
                );
                candidate.reject(reason)
            }
            None => candidate.accept(),
        }
    }

    fn first_failure(&self, pattern: &str, cluster: &StringCluster) -> Option<RejectionReason> {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                let detail = e.to_string().lines().last().unwrap_or_default().trim().to_string();
                return Some(RejectionReason::CompileFailure(detail));
            }
        };

        if let Some(missed) = cluster.distinct_values().into_iter().find(|v| !re.is_match(v)) {
            return Some(RejectionReason::MissesMember(missed.to_string()));
        }

        if let Some(violation) = self.bounds.violation(&RegexMetrics::of(pattern)) {
            return Some(RejectionReason::OutOfBounds(violation));
        }

        self.denylist
            .iter()
            .find(|sample| re.is_match(sample))
            .map(|sample| RejectionReason::DenylistMatch(sample.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarasmith_core::{ExtractedString, LengthClass};

    fn versions_cluster() -> StringCluster {
        StringCluster {
            id: 4,
            length_class: LengthClass::Short,
            representative: "malware_v1".to_string(),
            members: ["malware_v1", "malware_v2", "malware_v3"]
                .iter()
                .map(|v| ExtractedString::text(*v, "r"))
                .collect(),
        }
    }

    fn evaluate(pattern: &str) -> RegexCandidate {
        RegexFilter::default().evaluate(RegexCandidate::new(4, pattern, 1), &versions_cluster())
    }

    #[test]
    fn test_accepts_generalizing_pattern() {
        let candidate = evaluate("malware_v[0-9]+");
        assert!(candidate.passes_filter);
        assert_eq!(candidate.rejection, None);
    }

    #[test]
    fn test_uncompilable_pattern() {
        let candidate = evaluate("malware_v[0-9");
        assert!(!candidate.passes_filter);
        assert_eq!(candidate.rejection.unwrap().label(), "compile failure");
    }

    #[test]
    fn test_pattern_missing_a_member() {
        let candidate = evaluate("malware_v[12]");
        assert_eq!(
            candidate.rejection,
            Some(RejectionReason::MissesMember("malware_v3".to_string()))
        );
    }

    #[test]
    fn test_pattern_out_of_bounds() {
        let candidate = evaluate("mal.*");
        assert!(matches!(candidate.rejection, Some(RejectionReason::OutOfBounds(ref d)) if d.starts_with("length 5")));

        let candidate = evaluate("m?a?l?w?are_v[0-9]");
        assert!(matches!(candidate.rejection, Some(RejectionReason::OutOfBounds(ref d)) if d.contains("quantifiers")));
    }

    #[test]
    fn test_pattern_matching_empty_string_hits_denylist() {
        let candidate = evaluate("(malware_v[0-9])?");
        assert_eq!(
            candidate.rejection,
            Some(RejectionReason::DenylistMatch(String::new()))
        );
    }

    #[test]
    fn test_checks_run_in_order() {
        // Both misses members and is too short; the member check comes first
        let candidate = evaluate("xyz");
        assert!(matches!(candidate.rejection, Some(RejectionReason::MissesMember(_))));
    }

    #[test]
    fn test_bounds_accept_upper_limits() {
        let bounds = RegexBounds::default();
        let metrics = RegexMetrics::of(&"a".repeat(150));
        assert_eq!(bounds.violation(&metrics), None);
        let metrics = RegexMetrics::of(&"a".repeat(151));
        assert!(bounds.violation(&metrics).is_some());
    }
}
