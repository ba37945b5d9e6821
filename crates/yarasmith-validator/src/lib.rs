//! Syntax validation and auto-correction for generated rules.
//!
//! A rule is checked by a [`SyntaxChecker`]; rejected rules are sent to a
//! correction service together with the diagnostic, and the revised text is
//! checked again. The loop is an explicit state machine (see [`state`]) so
//! each exit (valid, attempt bound, no progress, checker unreachable) can be
//! exercised on its own.

mod checker;
mod corrector;
pub mod state;

pub use checker::{SyntaxChecker, SyntaxVerdict, YaraBinaryChecker};
pub use corrector::Corrector;
pub use state::{CorrectionEvent, CorrectionOutcome, CorrectionState, transition};
