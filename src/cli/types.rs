//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::event::EventArgs;
use crate::cli::commands::import::ImportArgs;
use crate::cli::commands::init::InitArgs;
use crate::cli::commands::launch::LaunchArgs;
use crate::cli::commands::merge::MergeArgs;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "launch-merge")]
#[command(about = "Fold rerun test launches into one canonical execution record", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .launch-merge/config.yaml)
    #[arg(short, long, global = true, env = "LAUNCH_MERGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Subcommands of the `launch-merge` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database in the current project
    Init(InitArgs),

    /// Import a launch from a JSON report
    Import(ImportArgs),

    /// Inspect stored launches
    Launch(LaunchArgs),

    /// Merge two or more launches into one
    Merge(MergeArgs),

    /// Inspect merge completion events
    Event(EventArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge_command() {
        let cli = Cli::try_parse_from([
            "launch-merge", "--json", "merge", "1a2b3c4d", "5e6f7a8b", "--strategy", "basic",
            "--name", "Nightly",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.launches, vec!["1a2b3c4d", "5e6f7a8b"]);
                assert_eq!(args.strategy.as_deref(), Some("basic"));
                assert_eq!(args.name.as_deref(), Some("Nightly"));
                assert!(args.target.is_none());
            }
            other => panic!("Expected merge command, got {other:?}"),
        }
    }
}
