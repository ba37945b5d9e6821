//! Rule generation from threat descriptors.

use log::{debug, warn};
use std::path::Path;

use yarasmith_core::rule_text::{extract_rule_block, is_unacceptable_rule_response};
use yarasmith_core::{CandidateRule, ServiceError, ThreatDescriptor};
use yarasmith_llm::{PromptBuilder, TextService};
use yarasmith_reports::{SkipEntry, rule_filename};

pub const STAGE: &str = "generate";

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Generated(CandidateRule),
    Rejected { descriptor_id: String, reason: String },
}

/// Descriptors that still need a rule, capped at `max_queries`.
///
/// Descriptors with an existing rule file and those beyond the cap become
/// skip entries.
pub fn select_pending(
    descriptors: Vec<ThreatDescriptor>,
    rule_folder: &Path,
    max_queries: usize,
) -> (Vec<ThreatDescriptor>, Vec<SkipEntry>) {
    let mut pending = Vec::new();
    let mut skipped = Vec::new();

    for descriptor in descriptors {
        let id = descriptor.id();
        let reason = if rule_folder.join(rule_filename(&id)).exists() {
            "rule already exists"
        } else if pending.len() >= max_queries {
            "query limit reached"
        } else {
            pending.push(descriptor);
            continue;
        };
        skipped.push(SkipEntry {
            stage: STAGE.to_string(),
            id,
            reason: reason.to_string(),
        });
    }

    (pending, skipped)
}

pub struct RuleGenerator<T> {
    service: T,
    prompts: PromptBuilder,
}

impl<T: TextService> RuleGenerator<T> {
    pub fn new(service: T, prompts: PromptBuilder) -> Self {
        Self { service, prompts }
    }

    /// Request one rule. Permanent service failures are returned; everything
    /// else ends in an outcome.
    pub async fn generate(&self, descriptor: &ThreatDescriptor) -> Result<GenerationOutcome, ServiceError> {
        let descriptor_id = descriptor.id();
        let prompt = self.prompts.build_rule_generation_prompt(descriptor);

        let response = match self.service.request(&prompt).await {
            Ok(response) => response,
            Err(ServiceError::Transient(message)) => {
                warn!("Generation for {} failed: {}", descriptor_id, message);
                return Ok(GenerationOutcome::Rejected {
                    descriptor_id,
                    reason: format!("service unavailable: {}", message),
                });
            }
            Err(e) => return Err(e),
        };

        let text = extract_rule_block(&response);
        let reason = if is_unacceptable_rule_response(&text) {
            "placeholder response"
        } else if !text.contains("rule ") {
            "no rule in response"
        } else {
            debug!("Generated rule for {}", descriptor_id);
            return Ok(GenerationOutcome::Generated(CandidateRule::new(descriptor_id, text)));
        };

        Ok(GenerationOutcome::Rejected {
            descriptor_id,
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Canned(Result<String, ServiceError>);

    #[async_trait]
    impl TextService for Canned {
        async fn request(&self, _context: &str) -> Result<String, ServiceError> {
            self.0.clone()
        }
    }

    fn descriptor(number: u64) -> ThreatDescriptor {
        ThreatDescriptor::new("exploit", number, "heap spray in a media parser")
    }

    #[tokio::test]
    async fn test_generated_rule_is_cut_from_response() {
        let response = "Here you go:\n```yara\nrule exploit_5 { strings: $a = \"heap_spray_marker\" condition: $a }\n```";
        let generator = RuleGenerator::new(Canned(Ok(response.to_string())), PromptBuilder::new());

        match generator.generate(&descriptor(5)).await.unwrap() {
            GenerationOutcome::Generated(rule) => {
                assert_eq!(rule.descriptor_id, "exploit_5");
                assert!(rule.text.starts_with("rule exploit_5"));
                assert!(rule.text.ends_with('}'));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_placeholder_response_is_rejected() {
        let response = "rule exploit_5 { strings: $a = \"ip_address_here\" condition: $a }";
        let generator = RuleGenerator::new(Canned(Ok(response.to_string())), PromptBuilder::new());

        let outcome = generator.generate(&descriptor(5)).await.unwrap();
        assert_eq!(
            outcome,
            GenerationOutcome::Rejected {
                descriptor_id: "exploit_5".to_string(),
                reason: "placeholder response".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failure_rejects_and_permanent_propagates() {
        let generator = RuleGenerator::new(
            Canned(Err(ServiceError::Transient("429".to_string()))),
            PromptBuilder::new(),
        );
        assert!(matches!(
            generator.generate(&descriptor(1)).await.unwrap(),
            GenerationOutcome::Rejected { .. }
        ));

        let generator = RuleGenerator::new(
            Canned(Err(ServiceError::Permanent("bad key".to_string()))),
            PromptBuilder::new(),
        );
        assert!(generator.generate(&descriptor(1)).await.is_err());
    }

    #[test]
    fn test_select_pending_skips_existing_and_caps() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("exploit_3.yar"), "rule exploit_3 {}").unwrap();

        let descriptors = (1..=4).rev().map(descriptor).collect();
        let (pending, skipped) = select_pending(descriptors, temp.path(), 2);

        let ids: Vec<_> = pending.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["exploit_4", "exploit_2"]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].reason, "rule already exists");
        assert_eq!(skipped[1].id, "exploit_1");
        assert_eq!(skipped[1].reason, "query limit reached");
    }
}
