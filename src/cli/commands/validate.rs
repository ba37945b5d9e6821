//! Validate command: syntax check, correction and classification.

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::report_summary;
use crate::config::YarasmithConfig;
use crate::pipeline::ModelPipeline;

pub async fn run_validate_command(config: YarasmithConfig, summary_json: Option<&Path>) -> Result<()> {
    let pipeline = ModelPipeline::from_config(config);
    let summary = pipeline.validate().await?;
    report_summary(&summary, summary_json)
}
