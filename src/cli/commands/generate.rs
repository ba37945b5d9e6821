//! Generate command: threat descriptors to rule files.

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::report_summary;
use crate::config::YarasmithConfig;
use crate::pipeline::ModelPipeline;

pub async fn run_generate_command(config: YarasmithConfig, summary_json: Option<&Path>) -> Result<()> {
    let pipeline = ModelPipeline::from_config(config);
    let summary = pipeline.generate().await?;
    report_summary(&summary, summary_json)
}
