use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;

use yarasmith::cli::{Args, RootCommand};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level())).init();

    // Handle Ctrl+C gracefully
    tokio::select! {
        result = RootCommand::execute(args) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted by user");
            std::process::exit(130);
        }
    }
}
