use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod commands;

use devtrack::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();
    let command = args.get_command();

    // Commands that never touch the store run without loading configuration,
    // so a broken config file can still be regenerated.
    match &command {
        cli::Commands::Version => {
            println!("devtrack v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        cli::Commands::GenerateConfig { output, force } => {
            init_tracing("info", "text");
            return commands::config::generate(output, *force);
        }
        _ => {}
    }

    let cfg = config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Serve => {
            commands::serve::execute(cfg).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(&cfg)?;
        }
        cli::Commands::Stats { hours, top } => {
            commands::stats::execute(&cfg, hours, top).await?;
        }
        cli::Commands::Prune {
            all,
            path_pattern,
            status_code,
            older_than_days,
        } => {
            let criteria = commands::prune::criteria_from_flags(
                all,
                path_pattern,
                status_code,
                older_than_days,
            )
            .context("No deletion criteria provided")?;
            commands::prune::execute(&cfg, criteria).await?;
        }
        cli::Commands::Version | cli::Commands::GenerateConfig { .. } => {}
    }

    Ok(())
}
