//! Output side of yarasmith.
//!
//! This crate provides:
//! - The categorized rule store (one bucket directory per category)
//! - The filtered regex store (`accepted.jsonl` / `rejected.jsonl`)
//! - Master rule assembly from accepted patterns
//! - Run summaries
//! - Filename generation utilities

mod error;
pub mod filename;
mod master_rule;
mod store;
mod summary;

pub use error::StoreError;
pub use filename::{master_rule_filename, rule_filename};
pub use master_rule::{MasterRule, assemble_master_rules, escape_regex_literal};
pub use store::{
    ACCEPTED_FILE, AcceptedRegex, MASTER_RULES_DIR, REGEX_STORE_DIR, REJECTED_FILE, RegexStore, RejectedRegex,
    RuleStore, StoredRule, rule_files,
};
pub use summary::{RunSummary, SkipEntry};
