use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devtrack", version, about = "Request tracking and analytics store")]
pub struct Cli {
    /// Configuration file path (default: ./devtrack.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the devtrack server (default)
    Serve,

    /// Test configuration file validity
    Test,

    /// Display request statistics from the store
    Stats {
        /// Number of hours to analyze (default: 24)
        #[arg(short = 'n', long, default_value = "24")]
        hours: u32,

        /// Maximum number of consumers to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Delete stored request logs (exactly one criterion)
    #[command(group(
        ArgGroup::new("criteria")
            .required(true)
            .args(["all", "path_pattern", "status_code", "older_than_days"])
    ))]
    Prune {
        /// Delete every record
        #[arg(long)]
        all: bool,

        /// Delete records whose route template matches exactly
        #[arg(long)]
        path_pattern: Option<String>,

        /// Delete records with this response status
        #[arg(long)]
        status_code: Option<u16>,

        /// Delete records received more than N days ago
        #[arg(long)]
        older_than_days: Option<u32>,
    },

    /// Write a default configuration file
    GenerateConfig {
        /// Output path
        #[arg(short, long, default_value = "devtrack.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::try_parse_from(["devtrack"]).unwrap();
        assert!(cli.config.is_none());
        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["devtrack", "stats", "--config", "/etc/devtrack.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/devtrack.toml")));

        match cli.get_command() {
            Commands::Stats { hours, top } => {
                assert_eq!(hours, 24);
                assert_eq!(top, 10);
            }
            _ => panic!("Expected Stats command"),
        }
    }

    #[test]
    fn test_cli_parsing_stats_hours() {
        let cli = Cli::try_parse_from(["devtrack", "stats", "-n", "6"]).unwrap();
        match cli.get_command() {
            Commands::Stats { hours, .. } => assert_eq!(hours, 6),
            _ => panic!("Expected Stats command"),
        }
    }

    #[test]
    fn test_cli_parsing_prune() {
        let cli = Cli::try_parse_from(["devtrack", "prune", "--older-than-days", "30"]).unwrap();
        match cli.get_command() {
            Commands::Prune {
                all,
                older_than_days,
                ..
            } => {
                assert!(!all);
                assert_eq!(older_than_days, Some(30));
            }
            _ => panic!("Expected Prune command"),
        }
    }

    #[test]
    fn test_prune_requires_exactly_one_criterion() {
        assert!(Cli::try_parse_from(["devtrack", "prune"]).is_err());
        assert!(Cli::try_parse_from(["devtrack", "prune", "--all", "--status-code", "500"]).is_err());
    }

    #[test]
    fn test_cli_parsing_generate_config() {
        let cli = Cli::try_parse_from(["devtrack", "generate-config", "--force"]).unwrap();
        match cli.get_command() {
            Commands::GenerateConfig { output, force } => {
                assert!(force);
                assert_eq!(output, PathBuf::from("devtrack.toml"));
            }
            _ => panic!("Expected GenerateConfig command"),
        }
    }
}
