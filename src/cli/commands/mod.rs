pub mod generate;
pub mod regex;
pub mod run;
pub mod validate;

pub use generate::run_generate_command;
pub use self::regex::run_regex_command;
pub use run::run_all_command;
pub use validate::run_validate_command;

use anyhow::{Context, Result};
use std::path::Path;

use yarasmith_reports::RunSummary;

/// Print the summary and optionally save it as JSON.
pub(crate) fn report_summary(summary: &RunSummary, summary_json: Option<&Path>) -> Result<()> {
    println!("\n{}", summary);

    if !summary.skipped.is_empty() {
        println!("\n⚠ Skipped inputs:");
        for entry in &summary.skipped {
            println!("  [{}] {}: {}", entry.stage, entry.id, entry.reason);
        }
    }

    if let Some(path) = summary_json {
        summary
            .save_to_file(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("📝 Summary written to {}", path.display());
    }
    Ok(())
}
