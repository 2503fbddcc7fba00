//! Launch CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::adapters::sqlite::SqliteLaunchRepository;
use crate::cli::display::{list_table, render_item_tree, render_list, styled_status};
use crate::cli::id_resolver::resolve_launch_id;
use crate::cli::output::{output, short_id, truncate, CommandOutput};
use crate::cli::{load_config, open_database};
use crate::domain::models::{ItemAttribute, ItemStatus, ItemTree, Launch, Statistics};
use crate::domain::ports::{LaunchFilter, LaunchRepository};

/// Arguments of `launch-merge launch`.
#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Launch subcommand to run.
    #[command(subcommand)]
    pub command: LaunchCommands,
}

/// Subcommands of `launch-merge launch`.
#[derive(Subcommand, Debug)]
pub enum LaunchCommands {
    /// List launches, newest first
    List {
        /// Filter by project
        #[arg(short, long)]
        project: Option<String>,
        /// Filter by launch name
        #[arg(short, long)]
        name: Option<String>,
        /// Include launches retired by earlier merges
        #[arg(short, long)]
        all: bool,
        /// Maximum number of launches to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Show a launch and its item tree
    Show {
        /// Launch ID or unique prefix
        id: String,
    },
}

/// One launch as printed by the CLI.
#[derive(Debug, serde::Serialize)]
pub struct LaunchOutput {
    /// Launch ID.
    pub id: String,
    /// Owning project.
    pub project: String,
    /// Launch name.
    pub name: String,
    /// Launch number within its name.
    pub number: i64,
    /// Launch status.
    pub status: String,
    /// Launch mode.
    pub mode: String,
    /// Start time, RFC 3339.
    pub start_time: String,
    /// End time, RFC 3339, once finished.
    pub end_time: Option<String>,
    /// Aggregated counters.
    pub statistics: Statistics,
    /// Whether a merge retired this launch.
    pub retired: bool,
}

impl From<&Launch> for LaunchOutput {
    fn from(launch: &Launch) -> Self {
        Self {
            id: launch.id.to_string(),
            project: launch.project.clone(),
            name: launch.name.clone(),
            number: launch.number,
            status: launch.status.as_str().to_string(),
            mode: launch.mode.as_str().to_string(),
            start_time: launch.start_time.to_rfc3339(),
            end_time: launch.end_time.map(|t| t.to_rfc3339()),
            statistics: launch.statistics,
            retired: launch.retired,
        }
    }
}

/// Launches matching a `list` query.
#[derive(Debug, serde::Serialize)]
pub struct LaunchListOutput {
    /// Matching launches, newest first.
    pub launches: Vec<LaunchOutput>,
    #[serde(skip)]
    statuses: Vec<ItemStatus>,
}

impl CommandOutput for LaunchListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "#", "status", "passed", "failed", "skipped", "started"]);
        for (launch, status) in self.launches.iter().zip(&self.statuses) {
            let mut name = truncate(&launch.name, 32);
            if launch.retired {
                name.push_str(" (retired)");
            }
            table.add_row(vec![
                launch.id[..8].to_string(),
                name,
                launch.number.to_string(),
                styled_status(*status),
                launch.statistics.passed.to_string(),
                launch.statistics.failed.to_string(),
                launch.statistics.skipped.to_string(),
                launch.start_time.clone(),
            ]);
        }
        render_list("launch", "launches", table, self.launches.len())
    }
}

/// One item of a shown launch.
#[derive(Debug, serde::Serialize)]
pub struct LaunchItemOutput {
    /// Item ID.
    pub id: String,
    /// Parent item ID; absent for roots.
    pub parent_id: Option<String>,
    /// Item name.
    pub name: String,
    /// Item type.
    pub item_type: String,
    /// Item status.
    pub status: String,
    /// Item counters.
    pub statistics: Statistics,
    /// Number of retries kept under this item.
    pub retries: usize,
}

/// A launch with its full item tree.
#[derive(Debug, serde::Serialize)]
pub struct LaunchDetailOutput {
    /// The launch row.
    pub launch: LaunchOutput,
    /// Launch description.
    pub description: Option<String>,
    /// Launch attributes.
    pub attributes: Vec<ItemAttribute>,
    /// Items, parents before children.
    pub items: Vec<LaunchItemOutput>,
    #[serde(skip)]
    rendered_tree: String,
}

impl LaunchDetailOutput {
    fn new(tree: &ItemTree) -> Self {
        let items = tree
            .preorder()
            .into_iter()
            .map(|idx| {
                let node = tree.node(idx);
                LaunchItemOutput {
                    id: node.item.id.to_string(),
                    parent_id: node.item.parent_id.map(|id| id.to_string()),
                    name: node.item.name.clone(),
                    item_type: node.item.item_type.as_str().to_string(),
                    status: node.item.status.as_str().to_string(),
                    statistics: node.item.statistics,
                    retries: node.retries.len(),
                }
            })
            .collect();

        Self {
            launch: LaunchOutput::from(&tree.launch),
            description: tree.launch.description.clone(),
            attributes: tree.launch.attributes.clone(),
            items,
            rendered_tree: render_item_tree(tree),
        }
    }
}

impl CommandOutput for LaunchDetailOutput {
    fn to_human(&self) -> String {
        let l = &self.launch;
        let mut lines = vec![
            format!("Launch: {} #{}", l.name, l.number),
            format!("ID: {}", l.id),
            format!("Project: {}", l.project),
            format!("Status: {}{}", l.status, if l.retired { " (retired)" } else { "" }),
            format!("Mode: {}", l.mode),
            format!("Started: {}", l.start_time),
        ];
        if let Some(end) = &l.end_time {
            lines.push(format!("Finished: {}", end));
        }
        if let Some(description) = &self.description {
            lines.push(format!("Description: {}", description));
        }
        lines.push(format!(
            "Statistics: {} total, {} passed, {} failed, {} skipped",
            l.statistics.total, l.statistics.passed, l.statistics.failed, l.statistics.skipped
        ));
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|a| match &a.key {
                    Some(key) => format!("{}={}", key, a.value),
                    None => a.value.clone(),
                })
                .collect();
            lines.push(format!("Attributes: {}", attrs.join(", ")));
        }
        lines.push(String::new());
        lines.push(self.rendered_tree.trim_end().to_string());
        lines.join("\n")
    }
}

/// Run a `launch` subcommand.
pub async fn execute(args: LaunchArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let pool = open_database(&config).await?;
    let repo = SqliteLaunchRepository::new(pool.clone());

    match args.command {
        LaunchCommands::List { project, name, all, limit } => {
            let launches = repo
                .list(LaunchFilter { project, name, include_retired: all, limit: Some(limit) })
                .await?;
            let out = LaunchListOutput {
                statuses: launches.iter().map(|l| l.status).collect(),
                launches: launches.iter().map(LaunchOutput::from).collect(),
            };
            output(&out, json_mode);
        }
        LaunchCommands::Show { id } => {
            let id = resolve_launch_id(&pool, &id).await?;
            let launch = repo
                .get(id)
                .await?
                .with_context(|| format!("Launch {} not found", short_id(&id)))?;
            // A merge retires a source launch together with its items.
            let items = repo.get_items(id, launch.retired).await?;
            let tree = ItemTree::from_items(launch, items)?;
            output(&LaunchDetailOutput::new(&tree), json_mode);
        }
    }

    Ok(())
}
