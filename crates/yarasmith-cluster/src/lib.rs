//! String extraction and similarity clustering.
//!
//! Literals are pulled out of accepted rules, grouped by normalized indel
//! similarity against cluster representatives, and handed to regex synthesis.

mod engine;
mod extract;
mod similarity;

pub use engine::{ClusterConfig, Clustering, cluster};
pub use extract::extract_strings;
pub use similarity::indel_similarity;
