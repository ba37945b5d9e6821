//! Correction loop state machine.
//!
//! ```text
//! Pending ─Start─▶ Checking ─CheckPassed─▶ Valid
//!                     │  ▲
//!          CheckFailed│  │Corrected(Revised)
//!                     ▼  │
//!                  Correcting ─(Unchanged | Unacceptable | Unavailable)─▶ Failed
//! ```
//!
//! `Checking` also fails directly when the attempt bound is reached or the
//! checker cannot be reached.

use yarasmith_core::FailureReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionState {
    Pending,
    Checking {
        attempt: u32,
    },
    Correcting {
        attempt: u32,
        diagnostic: String,
    },
    Valid {
        attempt: u32,
    },
    Failed {
        attempt: u32,
        reason: FailureReason,
        diagnostic: Option<String>,
    },
}

impl CorrectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CorrectionState::Valid { .. } | CorrectionState::Failed { .. })
    }
}

/// What the correction service produced for a rejected rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// New text, different from the text just checked.
    Revised,
    /// Byte-identical to the text just checked.
    Unchanged,
    /// Text carries template placeholders.
    Unacceptable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionEvent {
    Start,
    CheckPassed,
    CheckFailed { diagnostic: String },
    CheckerUnreachable { message: String },
    Corrected(CorrectionOutcome),
    CorrectionUnavailable,
}

/// Advance the loop by one event. Events that do not apply to the current
/// state leave it unchanged; terminal states absorb every event.
pub fn transition(state: CorrectionState, event: CorrectionEvent, max_attempts: u32) -> CorrectionState {
    use CorrectionEvent as E;
    use CorrectionState as S;

    match (state, event) {
        (S::Pending, E::Start) => S::Checking { attempt: 1 },

        (S::Checking { attempt }, E::CheckPassed) => S::Valid { attempt },
        (S::Checking { attempt }, E::CheckFailed { diagnostic }) => {
            if attempt >= max_attempts.max(1) {
                S::Failed {
                    attempt,
                    reason: FailureReason::AttemptsExhausted,
                    diagnostic: Some(diagnostic),
                }
            } else {
                S::Correcting { attempt, diagnostic }
            }
        }
        (S::Checking { attempt }, E::CheckerUnreachable { message }) => S::Failed {
            attempt,
            reason: FailureReason::CheckerUnreachable,
            diagnostic: Some(message),
        },

        (S::Correcting { attempt, .. }, E::Corrected(CorrectionOutcome::Revised)) => S::Checking {
            attempt: attempt + 1,
        },
        (S::Correcting { attempt, diagnostic }, E::Corrected(CorrectionOutcome::Unchanged)) => S::Failed {
            attempt,
            reason: FailureReason::NoProgress,
            diagnostic: Some(diagnostic),
        },
        (S::Correcting { attempt, diagnostic }, E::Corrected(CorrectionOutcome::Unacceptable)) => S::Failed {
            attempt,
            reason: FailureReason::UnacceptableCorrection,
            diagnostic: Some(diagnostic),
        },
        (S::Correcting { attempt, diagnostic }, E::CorrectionUnavailable) => S::Failed {
            attempt,
            reason: FailureReason::CorrectionUnavailable,
            diagnostic: Some(diagnostic),
        },

        (state, _) => state,
    }
}
