//! Drives the correction state machine against real capabilities.

use std::sync::Arc;

use log::{debug, info, warn};

use yarasmith_core::rule_text::{extract_rule_block, is_unacceptable_rule_response};
use yarasmith_core::{CandidateRule, CheckerUnavailable, ServiceError, ValidationResult};
use yarasmith_llm::{PromptBuilder, RetryPolicy, TextService, Throttle};

use crate::checker::{SyntaxChecker, SyntaxVerdict};
use crate::state::{CorrectionEvent, CorrectionOutcome, CorrectionState, transition};

const UNKNOWN_DIAGNOSTIC: &str = "unknown syntax error";

/// Validates a rule and, while it is rejected, asks the correction service
/// for a revision.
pub struct Corrector<C, T> {
    checker: C,
    correction: T,
    prompts: PromptBuilder,
    checker_policy: RetryPolicy,
    throttle: Option<Arc<Throttle>>,
}

impl<C: SyntaxChecker, T: TextService> Corrector<C, T> {
    pub fn new(checker: C, correction: T, checker_policy: RetryPolicy) -> Self {
        Self {
            checker,
            correction,
            prompts: PromptBuilder::new(),
            checker_policy,
            throttle: None,
        }
    }

    /// Take a concurrency slot from `throttle` before every syntax check.
    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// Run the loop to a terminal state.
    ///
    /// Returns the final rule text (the last revision that was checked) and the
    /// validation result. Only a permanent correction-service failure is an
    /// error; every other failure ends in an invalid result.
    pub async fn validate_and_correct(
        &self,
        mut rule: CandidateRule,
        max_attempts: u32,
    ) -> Result<(CandidateRule, ValidationResult), ServiceError> {
        let mut state = transition(CorrectionState::Pending, CorrectionEvent::Start, max_attempts);

        loop {
            let event = match &state {
                CorrectionState::Pending => CorrectionEvent::Start,
                CorrectionState::Checking { attempt } => {
                    debug!("Checking {} (attempt {})", rule.descriptor_id, attempt);
                    self.check(&rule.text).await
                }
                CorrectionState::Correcting { attempt, diagnostic } => {
                    info!(
                        "Rule {} rejected on attempt {}: {}",
                        rule.descriptor_id, attempt, diagnostic
                    );
                    self.correct(&mut rule, diagnostic).await?
                }
                CorrectionState::Valid { attempt } => {
                    info!("Rule {} valid after {} attempt(s)", rule.descriptor_id, attempt);
                    let result = ValidationResult::valid(rule.descriptor_id.clone(), *attempt);
                    return Ok((rule, result));
                }
                CorrectionState::Failed {
                    attempt,
                    reason,
                    diagnostic,
                } => {
                    warn!(
                        "Rule {} invalid after {} attempt(s): {}",
                        rule.descriptor_id, attempt, reason
                    );
                    let result = ValidationResult::failed(
                        rule.descriptor_id.clone(),
                        *attempt,
                        *reason,
                        diagnostic.clone(),
                    );
                    return Ok((rule, result));
                }
            };

            state = transition(state, event, max_attempts);
        }
    }

    /// One syntax check under the checker policy: a throttle slot, then a
    /// timed call, retried with backoff while the checker is unavailable.
    pub async fn check_syntax(&self, text: &str) -> Result<SyntaxVerdict, CheckerUnavailable> {
        let timeout_secs = self.checker_policy.timeout.as_secs();
        self.checker_policy
            .run_gated(
                || async {
                    match &self.throttle {
                        Some(throttle) => Some(throttle.permit().await),
                        None => None,
                    }
                },
                || self.checker.check(text),
                |_: &CheckerUnavailable| true,
                || CheckerUnavailable(format!("syntax check timed out after {timeout_secs}s")),
            )
            .await
    }

    async fn check(&self, text: &str) -> CorrectionEvent {
        match self.check_syntax(text).await {
            Ok(verdict) if verdict.valid => CorrectionEvent::CheckPassed,
            Ok(verdict) => CorrectionEvent::CheckFailed {
                diagnostic: verdict
                    .message
                    .unwrap_or_else(|| UNKNOWN_DIAGNOSTIC.to_string()),
            },
            Err(e) => CorrectionEvent::CheckerUnreachable { message: e.0 },
        }
    }

    async fn correct(
        &self,
        rule: &mut CandidateRule,
        diagnostic: &str,
    ) -> Result<CorrectionEvent, ServiceError> {
        let prompt = self.prompts.build_correction_prompt(&rule.text, diagnostic);

        let response = match self.correction.request(&prompt).await {
            Ok(response) => response,
            Err(ServiceError::Transient(message)) => {
                warn!(
                    "Correction service unavailable for {}: {}",
                    rule.descriptor_id, message
                );
                return Ok(CorrectionEvent::CorrectionUnavailable);
            }
            Err(e) => return Err(e),
        };

        let revised = extract_rule_block(&response);
        if revised == rule.text {
            return Ok(CorrectionEvent::Corrected(CorrectionOutcome::Unchanged));
        }
        if is_unacceptable_rule_response(&revised) {
            debug!("Suggested correction for {} is insufficient", rule.descriptor_id);
            return Ok(CorrectionEvent::Corrected(CorrectionOutcome::Unacceptable));
        }

        rule.revise(revised);
        Ok(CorrectionEvent::Corrected(CorrectionOutcome::Revised))
    }
}
