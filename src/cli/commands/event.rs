//! Event CLI commands for inspecting merge completion history.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::sqlite::SqliteEventRepository;
use crate::cli::display::{list_table, render_list};
use crate::cli::id_resolver::resolve_launch_id;
use crate::cli::output::{output, CommandOutput};
use crate::cli::{load_config, open_database};
use crate::services::event_bus::PublishedEvent;
use crate::services::event_store::{EventQuery, EventStore};

/// Arguments of `launch-merge event`.
#[derive(Args, Debug)]
pub struct EventArgs {
    /// Event subcommand to run.
    #[command(subcommand)]
    pub command: EventCommands,
}

/// Subcommands of `launch-merge event`.
#[derive(Subcommand, Debug)]
pub enum EventCommands {
    /// Show event store statistics
    Stats,
    /// List recent merge events, newest first
    List {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Only events that produced or retired this launch
        #[arg(long)]
        launch: Option<String>,
    },
    /// Delete events older than the given age (e.g., "30d", "12h")
    Prune {
        /// Minimum age of events to delete
        #[arg(long, default_value = "30d")]
        older_than: String,
    },
}

/// Summary of the event store.
#[derive(Debug, serde::Serialize)]
pub struct EventStatsOutput {
    /// Number of stored events.
    pub total_events: u64,
    /// Highest sequence number, if any event exists.
    pub latest_sequence: Option<u64>,
}

impl CommandOutput for EventStatsOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Event Store Statistics:".to_string()];
        lines.push(format!("  Total events:     {}", self.total_events));
        lines.push(format!(
            "  Latest sequence:  {}",
            self.latest_sequence
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));
        lines.join("\n")
    }
}

/// Events matching a `list` query.
#[derive(Debug, serde::Serialize)]
pub struct EventListOutput {
    /// Matching events, newest first.
    pub events: Vec<PublishedEvent>,
}

impl CommandOutput for EventListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["seq", "completed", "strategy", "result", "retired", "items"]);
        for event in &self.events {
            let retired: Vec<String> = event
                .payload
                .retired_launch_ids
                .iter()
                .map(|id| id.to_string()[..8].to_string())
                .collect();
            table.add_row(vec![
                event.sequence.0.to_string(),
                event.payload.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                event.payload.strategy.to_string(),
                event.payload.result_launch_id.to_string()[..8].to_string(),
                retired.join(","),
                event.payload.merged_items.to_string(),
            ]);
        }
        render_list("event", "events", table, self.events.len())
    }
}

/// Result of pruning old events.
#[derive(Debug, serde::Serialize)]
pub struct PruneOutput {
    /// Number of events removed.
    pub deleted: u64,
    /// Age threshold as given on the command line.
    pub older_than: String,
}

impl CommandOutput for PruneOutput {
    fn to_human(&self) -> String {
        format!("Deleted {} event(s) older than {}", self.deleted, self.older_than)
    }
}

/// Parse an age such as "90s", "15m", "12h" or "30d".
fn parse_age(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        bail!("Age must not be empty");
    };
    let amount: u64 = raw[..raw.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid age '{}': expected a number followed by s, m, h or d", raw))?;
    let seconds = match unit {
        's' => amount,
        'm' => amount * 60,
        'h' => amount * 3600,
        'd' => amount * 86_400,
        _ => bail!("Invalid age unit '{}': expected s, m, h or d", unit),
    };
    Ok(Duration::from_secs(seconds))
}

/// Run an `event` subcommand.
pub async fn execute(args: EventArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let pool = open_database(&config).await?;
    let store = SqliteEventRepository::new(pool.clone());

    match args.command {
        EventCommands::Stats => {
            let out = EventStatsOutput {
                total_events: store.count().await?,
                latest_sequence: store.latest_sequence().await?.map(|s| s.0),
            };
            output(&out, json_mode);
        }
        EventCommands::List { limit, launch } => {
            let mut query = EventQuery::new().limit(limit);
            if let Some(launch) = launch {
                query = query.launch_id(resolve_launch_id(&pool, &launch).await?);
            }
            let events = store.query(query).await?;
            output(&EventListOutput { events }, json_mode);
        }
        EventCommands::Prune { older_than } => {
            let age = parse_age(&older_than)?;
            let deleted = store.prune_older_than(age).await?;
            output(&PruneOutput { deleted, older_than }, json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_age("12h").unwrap(), Duration::from_secs(12 * 3600));
        assert_eq!(parse_age("30d").unwrap(), Duration::from_secs(30 * 86_400));
        assert!(parse_age("").is_err());
        assert!(parse_age("3w").is_err());
        assert!(parse_age("d").is_err());
    }
}
