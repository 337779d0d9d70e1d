//! neon-testing CLI entry point.

use clap::Parser;

use neon_testing::cli::{self, Cli, Commands};
use neon_testing::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _logger = match LoggerImpl::init(&LogConfig {
        level: cli.log_level.clone(),
        ..LogConfig::default()
    }) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let result = match cli::load_options(cli.config.as_ref()) {
        Ok(options) => match cli.command {
            Commands::List(args) => cli::commands::list::execute(args, options, cli.json).await,
            Commands::Cleanup => cli::commands::cleanup::execute(options, cli.json).await,
        },
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        cli::handle_error(err, cli.json);
    }
}
