//! Launch Merge CLI entry point.

use clap::Parser;

use launch_merge::cli::{handle_error, load_config, Cli, Commands};
use launch_merge::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `init` runs before any configuration exists.
    let log_config = match &cli.command {
        Commands::Init(_) => LogConfig::default(),
        _ => match load_config(cli.config.as_deref()) {
            Ok(config) => LogConfig::from(&config.logging),
            Err(err) => handle_error(err, cli.json),
        },
    };
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => launch_merge::cli::commands::init::execute(args, cli.json).await,
        Commands::Import(args) => launch_merge::cli::commands::import::execute(args, cli.config, cli.json).await,
        Commands::Launch(args) => launch_merge::cli::commands::launch::execute(args, cli.config, cli.json).await,
        Commands::Merge(args) => launch_merge::cli::commands::merge::execute(args, cli.config, cli.json).await,
        Commands::Event(args) => launch_merge::cli::commands::event::execute(args, cli.config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
