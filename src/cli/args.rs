use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model used for generation, correction and pattern requests
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub api_base_url: Option<String>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Also write the run summary as JSON to this path
    #[arg(long, global = true)]
    pub summary_json: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Generate rules from threat descriptors in the download folder
    Generate,
    /// Validate, correct and classify every rule in the rule folder
    Validate,
    /// Cluster strings of acceptable rules and synthesize regex signatures
    Regex,
    /// Run generate, validate and regex in sequence
    Run,
}

impl Args {
    /// Default log filter for the given `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
