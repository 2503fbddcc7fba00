//! Command-line interface for the launch merge engine.

pub mod commands;
pub mod display;
pub mod event_helpers;
pub mod id_resolver;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::adapters::sqlite::initialize_database;
use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration from `path`, or from the project directory when absent.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured database, applying pending migrations.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_database(&config.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}. Run 'launch-merge init' first.",
                config.database.path
            )
        })
}

/// Print a command failure and exit with a status derived from its cause.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = exit_code(&err);
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "exit_code": code,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(code);
}

/// 2 for rejected requests, 3 for storage failures, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DomainError>() {
        Some(
            DomainError::UnknownStrategy(_)
            | DomainError::LaunchNotFound(_)
            | DomainError::NothingToMerge(_)
            | DomainError::InvalidMergeRequest(_)
            | DomainError::ValidationFailed(_),
        ) => 2,
        Some(
            DomainError::MergeCommit(_)
            | DomainError::DatabaseError(_)
            | DomainError::SerializationError(_),
        ) => 3,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_exit_codes() {
        let rejected = anyhow::Error::new(DomainError::LaunchNotFound(Uuid::new_v4()));
        assert_eq!(exit_code(&rejected), 2);

        let storage = anyhow::Error::new(DomainError::MergeCommit("disk full".to_string()))
            .context("Merge failed");
        assert_eq!(exit_code(&storage), 3);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
