//! Maintenance CLI for test branches.
//!
//! Out-of-band commands for the branches the lifecycle hooks create:
//! listing them and removing orphans left by interrupted runs.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::domain::models::NeonTestingOptions;
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser, Debug)]
#[command(
    name = "neon-testing",
    version,
    about = "Manage ephemeral Neon branches created by integration test suites"
)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// YAML config file to load instead of ./neon-testing.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List branches in the project with their test-marker status
    List(commands::list::ListArgs),
    /// Delete every branch carrying the test marker annotation
    Cleanup,
}

/// Resolve base options from `--config` or the default layering.
pub fn load_options(config: Option<&PathBuf>) -> Result<NeonTestingOptions> {
    match config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => ConfigLoader::load().context("failed to load configuration"),
    }
}

/// Print a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_with_global_json() {
        let cli = Cli::try_parse_from(["neon-testing", "list", "--marked-only", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::List(args) if args.marked_only));
    }

    #[test]
    fn test_parse_cleanup_with_config() {
        let cli =
            Cli::try_parse_from(["neon-testing", "--config", "ci.yaml", "cleanup"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        assert!(matches!(cli.command, Commands::Cleanup));
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["neon-testing", "create"]).is_err());
    }
}
