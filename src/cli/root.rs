use anyhow::Result;
use std::collections::HashMap;

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{run_all_command, run_generate_command, run_regex_command, run_validate_command};
use crate::config::YarasmithConfig;

pub struct RootCommand;

impl RootCommand {
    pub async fn execute(args: Args) -> Result<()> {
        if args.generate_config {
            print!("{}", YarasmithConfig::generate_default_config());
            return Ok(());
        }

        println!(
            r#"
          ┌───────────────┐
          │ rule {{ ... }}  │
          └──────┬────────┘
                 │
        Y A R A S M I T H
                 │
              v{}
"#,
            env!("CARGO_PKG_VERSION")
        );

        let Some(command) = args.command else {
            println!("No command given. Run `yarasmith --help` for usage.");
            return Ok(());
        };

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        let config = YarasmithConfig::load_with_precedence(args.config.as_deref(), &args, &env_vars)?;
        let summary_json = args.summary_json.as_deref();

        match command {
            Commands::Generate => run_generate_command(config, summary_json).await,
            Commands::Validate => run_validate_command(config, summary_json).await,
            Commands::Regex => run_regex_command(config, summary_json).await,
            Commands::Run => run_all_command(config, summary_json).await,
        }
    }
}
