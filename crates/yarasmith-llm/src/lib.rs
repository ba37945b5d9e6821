//! Text service plumbing for yarasmith.
//!
//! Rule generation, rule correction and regex synthesis all talk to a model
//! through the same [`TextService`] capability. This crate provides:
//! - the capability trait and a genai-backed implementation
//! - [`GuardedService`], which adds rate budgeting, a concurrency cap,
//!   per-call timeouts and exponential backoff to any service
//! - prompt builders and response parsing helpers

mod guard;
mod prompt;
mod response;
mod service;

pub use guard::{GuardedService, RateBudget, RetryPolicy, Throttle};
pub use prompt::PromptBuilder;
pub use response::extract_fenced_pattern;
pub use service::{GenaiService, TextService};
