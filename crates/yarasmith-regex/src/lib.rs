//! Regex synthesis and filtering for string clusters.
//!
//! Each cluster gets a single pattern request. The answer is parsed from a
//! fenced block and checked in order: it must compile, match every member,
//! respect the complexity bounds and stay clear of the denylist.

mod filter;
mod metrics;
mod synthesize;

pub use filter::{RegexBounds, RegexFilter, default_denylist};
pub use metrics::{ADVANCED_CONSTRUCTS, RegexMetrics};
pub use synthesize::{ClusterOutcome, PatternSynthesizer};
