//! Greedy single-linkage clustering.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use yarasmith_core::{ExtractedString, LengthClass, StringCluster};

use crate::similarity::indel_similarity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Minimum similarity to a representative for a string to join its cluster.
    pub similarity_threshold: f64,
    /// Clusters with fewer distinct values are discarded.
    pub min_cluster_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            min_cluster_size: 10,
        }
    }
}

/// Clusters kept after the size filter, plus how many were dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clustering {
    pub clusters: Vec<StringCluster>,
    pub discarded: usize,
}

/// Group strings by similarity to cluster representatives.
///
/// The input is sorted by value and owning rule before clustering, so the
/// result depends only on the set of strings and the configuration. Strings
/// are only compared within their length class.
pub fn cluster(mut strings: Vec<ExtractedString>, config: &ClusterConfig) -> Clustering {
    strings.sort();

    let mut by_class: BTreeMap<LengthClass, Vec<ExtractedString>> = BTreeMap::new();
    for s in strings {
        by_class.entry(s.length_class()).or_default().push(s);
    }

    let mut result = Clustering::default();
    for (length_class, members) in by_class {
        for candidate in greedy(length_class, members, config.similarity_threshold) {
            if candidate.distinct_values().len() >= config.min_cluster_size {
                result.clusters.push(StringCluster {
                    id: result.clusters.len(),
                    ..candidate
                });
            } else {
                result.discarded += 1;
            }
        }
    }

    debug!(
        "Clustering kept {} cluster(s), discarded {}",
        result.clusters.len(),
        result.discarded
    );
    result
}

fn greedy(length_class: LengthClass, strings: Vec<ExtractedString>, threshold: f64) -> Vec<StringCluster> {
    let mut clusters: Vec<StringCluster> = Vec::new();

    for s in strings {
        let home = clusters
            .iter_mut()
            .find(|c| c.representative == s.value || indel_similarity(&c.representative, &s.value) >= threshold);

        match home {
            Some(cluster) => cluster.members.push(s),
            None => clusters.push(StringCluster {
                id: 0,
                length_class,
                representative: s.value.clone(),
                members: vec![s],
            }),
        }
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[(&str, &str)]) -> Vec<ExtractedString> {
        values
            .iter()
            .map(|(value, rule)| ExtractedString::text(*value, *rule))
            .collect()
    }

    fn config(min_cluster_size: usize) -> ClusterConfig {
        ClusterConfig {
            similarity_threshold: 0.7,
            min_cluster_size,
        }
    }

    #[test]
    fn test_versions_cluster_and_singleton_is_dropped() {
        let input = strings(&[
            ("unrelated_token", "r4"),
            ("malware_v3", "r3"),
            ("malware_v1", "r1"),
            ("malware_v2", "r2"),
        ]);

        let result = cluster(input, &config(3));

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.discarded, 1);
        let c = &result.clusters[0];
        assert_eq!(c.id, 0);
        assert_eq!(c.representative, "malware_v1");
        assert_eq!(c.distinct_values(), vec!["malware_v1", "malware_v2", "malware_v3"]);
    }

    #[test]
    fn test_cluster_is_deterministic() {
        let values = [
            ("malware_v1", "r1"),
            ("malware_v2", "r2"),
            ("loader.dll", "r3"),
            ("loader.exe", "r4"),
            ("malware_v2", "r5"),
            ("loader32.dll", "r6"),
        ];
        let mut reversed = values;
        reversed.reverse();

        let first = cluster(strings(&values), &config(2));
        let second = cluster(strings(&reversed), &config(2));
        assert_eq!(first, second);
        assert_eq!(first.clusters.len(), 2);
    }

    #[test]
    fn test_minimum_size_counts_distinct_values() {
        let input = strings(&[("beacon_x", "r1"), ("beacon_x", "r2"), ("beacon_x", "r3")]);
        let result = cluster(input, &config(2));
        assert!(result.clusters.is_empty());
        assert_eq!(result.discarded, 1);
    }

    #[test]
    fn test_length_classes_are_not_mixed() {
        let short = "a".repeat(20);
        let medium = "a".repeat(21);
        let input = strings(&[(short.as_str(), "r1"), (medium.as_str(), "r2")]);
        let result = cluster(input, &config(1));

        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters[0].length_class, LengthClass::Short);
        assert_eq!(result.clusters[1].length_class, LengthClass::Medium);
        assert_eq!(result.clusters[1].id, 1);
    }

    #[test]
    fn test_members_meet_threshold_against_representative() {
        let input = strings(&[
            ("invoke-mimikatz", "r1"),
            ("invoke-mimikatz2", "r2"),
            ("invoke_mimikatz", "r3"),
            ("powershell -enc", "r4"),
            ("powershell -e", "r5"),
        ]);
        let result = cluster(input, &config(1));

        for c in &result.clusters {
            for m in &c.members {
                assert!(indel_similarity(&c.representative, &m.value) >= 0.7);
            }
        }
    }
}
