//! Implementation of the `launch-merge import` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::adapters::sqlite::SqliteLaunchRepository;
use crate::cli::output::{output, CommandOutput};
use crate::cli::{load_config, open_database};
use crate::services::launch_import::{import_launch, ImportSummary, LaunchDocument};

/// Arguments of `launch-merge import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON launch reports to import, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Override the project named in the reports
    #[arg(short, long)]
    pub project: Option<String>,
}

/// One launch stored from a report file.
#[derive(Debug, serde::Serialize)]
pub struct ImportedLaunch {
    /// Report the launch was read from.
    pub file: PathBuf,
    /// New launch ID.
    pub id: String,
    /// Launch name.
    pub name: String,
    /// Launch number within its name.
    pub number: i64,
    /// Derived launch status.
    pub status: String,
    /// Items stored, retries excluded.
    pub items: usize,
    /// Retries stored.
    pub retries: usize,
}

/// Result of importing one or more reports.
#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    /// Imported launches in argument order.
    pub imported: Vec<ImportedLaunch>,
}

impl ImportedLaunch {
    fn new(file: PathBuf, summary: &ImportSummary) -> Self {
        Self {
            file,
            id: summary.launch.id.to_string(),
            name: summary.launch.name.clone(),
            number: summary.launch.number,
            status: summary.launch.status.as_str().to_string(),
            items: summary.items,
            retries: summary.retries,
        }
    }
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        self.imported
            .iter()
            .map(|l| {
                format!(
                    "Imported {} #{} ({}) from {}: {} items, {} retries, {}",
                    l.name,
                    l.number,
                    &l.id[..8],
                    l.file.display(),
                    l.items,
                    l.retries,
                    l.status
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Import each report as a new launch.
pub async fn execute(args: ImportArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let pool = open_database(&config).await?;
    let repo = SqliteLaunchRepository::new(pool);

    let mut imported = Vec::with_capacity(args.files.len());
    for file in args.files {
        let json = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let mut document = LaunchDocument::from_json(&json)
            .with_context(|| format!("Invalid launch report {}", file.display()))?;
        if let Some(project) = &args.project {
            document.project.clone_from(project);
        }

        let summary = import_launch(&repo, document)
            .await
            .with_context(|| format!("Failed to import {}", file.display()))?;
        imported.push(ImportedLaunch::new(file, &summary));
    }

    output(&ImportOutput { imported }, json_mode);
    Ok(())
}
