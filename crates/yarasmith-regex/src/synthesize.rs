use log::{debug, warn};

use yarasmith_core::{RegexCandidate, ServiceError, StringCluster};
use yarasmith_llm::{PromptBuilder, TextService, extract_fenced_pattern};

use crate::filter::RegexFilter;

/// What happened to one cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    Accepted(RegexCandidate),
    Rejected(RegexCandidate),
    /// No candidate was produced.
    Skipped { cluster_id: usize, reason: String },
}

/// Requests one pattern per cluster and runs it through the filter.
pub struct PatternSynthesizer<T> {
    service: T,
    prompts: PromptBuilder,
    filter: RegexFilter,
}

impl<T: TextService> PatternSynthesizer<T> {
    pub fn new(service: T, filter: RegexFilter) -> Self {
        Self {
            service,
            prompts: PromptBuilder::new(),
            filter,
        }
    }

    /// Ask for a pattern covering the cluster's members.
    ///
    /// Transient service failures and responses without a fenced pattern skip
    /// the cluster. Permanent failures are returned.
    pub async fn synthesize(&self, cluster: &StringCluster) -> Result<Result<RegexCandidate, String>, ServiceError> {
        let prompt = self.prompts.build_regex_prompt(&cluster.distinct_values());

        let response = match self.service.request(&prompt).await {
            Ok(response) => response,
            Err(ServiceError::Transient(message)) => {
                warn!("Pattern request for cluster {} failed: {}", cluster.id, message);
                return Ok(Err(format!("service unavailable: {message}")));
            }
            Err(e) => return Err(e),
        };

        match extract_fenced_pattern(&response) {
            Some(pattern) => {
                debug!("Cluster {} -> {}", cluster.id, pattern);
                Ok(Ok(RegexCandidate::new(cluster.id, pattern, 1)))
            }
            None => Ok(Err("no pattern in response".to_string())),
        }
    }

    pub async fn synthesize_and_filter(&self, cluster: &StringCluster) -> Result<ClusterOutcome, ServiceError> {
        let candidate = match self.synthesize(cluster).await? {
            Ok(candidate) => candidate,
            Err(reason) => {
                return Ok(ClusterOutcome::Skipped {
                    cluster_id: cluster.id,
                    reason,
                });
            }
        };

        let evaluated = self.filter.evaluate(candidate, cluster);
        Ok(if evaluated.passes_filter {
            ClusterOutcome::Accepted(evaluated)
        } else {
            ClusterOutcome::Rejected(evaluated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use yarasmith_core::{ExtractedString, LengthClass};

    struct Canned(Result<String, ServiceError>);

    #[async_trait]
    impl TextService for Canned {
        async fn request(&self, context: &str) -> Result<String, ServiceError> {
            assert!(context.contains("- malware_v1"));
            self.0.clone()
        }
    }

    fn cluster(id: usize) -> StringCluster {
        StringCluster {
            id,
            length_class: LengthClass::Short,
            representative: "malware_v1".to_string(),
            members: ["malware_v1", "malware_v2", "malware_v3"]
                .iter()
                .map(|v| ExtractedString::text(*v, "r"))
                .collect(),
        }
    }

    fn synthesizer(response: Result<String, ServiceError>) -> PatternSynthesizer<Canned> {
        PatternSynthesizer::new(Canned(response), RegexFilter::default())
    }

    #[tokio::test]
    async fn test_accepted_pattern_matches_all_members() {
        let outcome = synthesizer(Ok("```regex\nmalware_v[0-9]+\n```".to_string()))
            .synthesize_and_filter(&cluster(2))
            .await
            .unwrap();

        let ClusterOutcome::Accepted(candidate) = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(candidate.cluster_id, 2);
        let re = regex::Regex::new(&candidate.pattern).unwrap();
        assert!(cluster(2).members.iter().all(|m| re.is_match(&m.value)));
    }

    #[tokio::test]
    async fn test_compile_failure_is_recorded() {
        let outcome = synthesizer(Ok("```\nmalware_v(\n```".to_string()))
            .synthesize_and_filter(&cluster(1))
            .await
            .unwrap();

        match outcome {
            ClusterOutcome::Rejected(candidate) => {
                assert_eq!(candidate.rejection.unwrap().label(), "compile failure")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_without_fence_is_skipped() {
        let outcome = synthesizer(Ok("malware_v[0-9]+".to_string()))
            .synthesize_and_filter(&cluster(1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ClusterOutcome::Skipped {
                cluster_id: 1,
                reason: "no pattern in response".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failure_skips_cluster() {
        let outcome = synthesizer(Err(ServiceError::Transient("timeout".to_string())))
            .synthesize_and_filter(&cluster(1))
            .await
            .unwrap();
        assert!(matches!(outcome, ClusterOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_returned() {
        let result = synthesizer(Err(ServiceError::Permanent("401".to_string())))
            .synthesize_and_filter(&cluster(1))
            .await;
        assert!(result.is_err());
    }
}
