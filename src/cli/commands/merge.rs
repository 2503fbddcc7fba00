//! Implementation of the `launch-merge merge` command.

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::sqlite::SqliteLaunchRepository;
use crate::cli::event_helpers::create_persistent_event_bus;
use crate::cli::id_resolver::{resolve_launch_id, resolve_launch_ids};
use crate::cli::output::{output, short_id, CommandOutput};
use crate::cli::{load_config, open_database};
use crate::domain::models::{
    ItemAttribute, LaunchMode, MatchKeyKind, MergeRequest, MergeStrategyType, Statistics,
};
use crate::services::launch_merge_service::{LaunchMergeService, MergeOutcome};

/// Arguments of `launch-merge merge`.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Source launch IDs or unique prefixes (at least two)
    #[arg(required = true, num_args = 2..)]
    pub launches: Vec<String>,

    /// Merge strategy (deep, basic); defaults to the configured strategy
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Existing launch whose tree is replaced by the result
    #[arg(short, long)]
    pub target: Option<String>,

    /// Name of the resulting launch
    #[arg(short, long)]
    pub name: Option<String>,

    /// Description of the resulting launch
    #[arg(short, long)]
    pub description: Option<String>,

    /// Mode of the resulting launch (default, debug)
    #[arg(long)]
    pub mode: Option<String>,

    /// Match key override (name_and_type, unique_id, code_ref, parameters)
    #[arg(short, long)]
    pub match_key: Option<String>,

    /// Extra attributes for the resulting launch ("key:value" or "tag")
    #[arg(short, long)]
    pub attribute: Vec<String>,
}

/// Result of a merge.
#[derive(Debug, serde::Serialize)]
pub struct MergeOutput {
    /// Whether the merge committed.
    pub success: bool,
    /// ID of the resulting launch.
    pub launch_id: String,
    /// Name of the resulting launch.
    pub name: String,
    /// Number of the resulting launch.
    pub number: i64,
    /// Status of the resulting launch.
    pub status: String,
    /// Strategy that produced the tree.
    pub strategy: String,
    /// Counters of the resulting launch.
    pub statistics: Statistics,
    /// Merged items written, retries excluded.
    pub merged_items: usize,
    /// Retries kept in the merged tree.
    pub retries: usize,
    /// Items retired from the target launch.
    pub replaced_items: u64,
    /// Source launches retired by the merge.
    pub retired_launch_ids: Vec<String>,
    /// Whether the merge event was published.
    pub event_published: bool,
}

impl From<&MergeOutcome> for MergeOutput {
    fn from(outcome: &MergeOutcome) -> Self {
        Self {
            success: true,
            launch_id: outcome.launch.id.to_string(),
            name: outcome.launch.name.clone(),
            number: outcome.launch.number,
            status: outcome.launch.status.as_str().to_string(),
            strategy: outcome.strategy.as_str().to_string(),
            statistics: outcome.launch.statistics,
            merged_items: outcome.merged_items,
            retries: outcome.retries,
            replaced_items: outcome.replaced_items,
            retired_launch_ids: outcome.retired_launch_ids.iter().map(ToString::to_string).collect(),
            event_published: outcome.event_published,
        }
    }
}

impl CommandOutput for MergeOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "Merged into {} #{} ({}) using the {} strategy.",
                self.name,
                self.number,
                &self.launch_id[..8],
                self.strategy
            ),
            format!("Status: {}", self.status),
            format!(
                "Items: {} ({} retries); {} passed, {} failed, {} skipped",
                self.merged_items,
                self.retries,
                self.statistics.passed,
                self.statistics.failed,
                self.statistics.skipped
            ),
        ];
        if self.replaced_items > 0 {
            lines.push(format!("Replaced {} items of the target launch", self.replaced_items));
        }
        if !self.retired_launch_ids.is_empty() {
            let retired: Vec<&str> = self.retired_launch_ids.iter().map(|id| &id[..8]).collect();
            lines.push(format!("Retired launches: {}", retired.join(", ")));
        }
        if !self.event_published {
            lines.push("Warning: the completion event could not be recorded".to_string());
        }
        lines.join("\n")
    }
}

/// Parse a `key:value` attribute, or a bare tag.
fn parse_attribute(raw: &str) -> ItemAttribute {
    match raw.split_once(':') {
        Some((key, value)) if !key.is_empty() => ItemAttribute::new(key, value),
        _ => ItemAttribute::tag(raw),
    }
}

/// Merge the given launches.
pub async fn execute(args: MergeArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let pool = open_database(&config).await?;

    let strategy = MergeStrategyType::parse(args.strategy.as_deref().unwrap_or(&config.merge.default_strategy))?;
    let launch_ids = resolve_launch_ids(&pool, &args.launches).await?;

    let mut request = MergeRequest::new(strategy, launch_ids);
    if let Some(target) = &args.target {
        request = request.with_target(resolve_launch_id(&pool, target).await?);
    }
    if let Some(name) = args.name {
        request = request.with_name(name);
    }
    if let Some(description) = args.description {
        request = request.with_description(description);
    }
    if let Some(mode) = &args.mode {
        request.mode = Some(LaunchMode::from_str(mode).ok_or_else(|| anyhow!("Invalid launch mode: {}", mode))?);
    }
    if let Some(key) = &args.match_key {
        request = request
            .with_match_key(MatchKeyKind::from_str(key).ok_or_else(|| anyhow!("Invalid match key: {}", key))?);
    }
    request.attributes = args.attribute.iter().map(|a| parse_attribute(a)).collect();

    let repo = Arc::new(SqliteLaunchRepository::new(pool.clone()));
    let event_bus = create_persistent_event_bus(pool).await?;
    let service = LaunchMergeService::from_config(repo, &config.merge, event_bus)?;

    let outcome = service.merge(request).await?;
    tracing::debug!(launch = %short_id(&outcome.launch.id), "merge command finished");

    output(&MergeOutput::from(&outcome), json_mode);
    Ok(())
}
