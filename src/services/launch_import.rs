//! Import of finished launches from JSON documents.
//!
//! A document describes one launch and its nested item tree. Container
//! statuses and all counters are derived from the leaves, so a document only
//! has to carry leaf statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    roll_up, ItemAttribute, ItemParameter, ItemStatus, ItemType, Launch, LaunchMode, Statistics,
    TestItem,
};
use crate::domain::ports::{LaunchFilter, LaunchRepository};

/// A launch as described in an import file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchDocument {
    /// Project of the imported launch.
    pub project: String,
    /// Launch name.
    pub name: String,
    /// Rerun number; the next free number for the name when absent.
    #[serde(default)]
    pub number: Option<i64>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Visibility mode; `DEFAULT` when absent.
    #[serde(default)]
    pub mode: LaunchMode,
    /// Start of the run.
    pub start_time: DateTime<Utc>,
    /// Launches without an end time are imported as still running.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Launch-level attributes.
    #[serde(default)]
    pub attributes: Vec<ItemAttribute>,
    /// Root items in sibling order.
    #[serde(default)]
    pub items: Vec<ItemDocument>,
}

/// One item of an import file with its children and earlier attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDocument {
    /// Item name.
    pub name: String,
    /// Node kind, serialized as `type`.
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Required on leaves; always derived from the children on containers.
    #[serde(default)]
    pub status: Option<ItemStatus>,
    /// Defaults to the parent's start time.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// End of the attempt.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Agent-reported unique ID.
    #[serde(default)]
    pub unique_id: Option<String>,
    /// Code reference.
    #[serde(default)]
    pub code_ref: Option<String>,
    /// Test parameters.
    #[serde(default)]
    pub parameters: Vec<ItemParameter>,
    /// Item attributes.
    #[serde(default)]
    pub attributes: Vec<ItemAttribute>,
    /// Child items in sibling order.
    #[serde(default)]
    pub children: Vec<ItemDocument>,
    /// Earlier attempts of this item, stored as retries.
    #[serde(default)]
    pub retries: Vec<ItemDocument>,
}

impl LaunchDocument {
    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// What an import stored.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// The stored launch.
    pub launch: Launch,
    /// Items stored, retries excluded.
    pub items: usize,
    /// Retry items stored.
    pub retries: usize,
}

/// Store `document` as a new launch in one unit of work.
pub async fn import_launch(
    repository: &dyn LaunchRepository,
    document: LaunchDocument,
) -> DomainResult<ImportSummary> {
    let number = match document.number {
        Some(number) => number,
        None => next_number(repository, &document.project, &document.name).await?,
    };

    let mut launch = Launch::new(document.project, document.name, document.start_time).with_number(number);
    launch.description = document.description;
    launch.mode = document.mode;
    launch.end_time = document.end_time;
    launch.attributes = document.attributes;

    let mut items = Vec::new();
    for (position, doc) in document.items.iter().enumerate() {
        flatten(doc, &launch, None, position as i64, document.start_time, &mut items)?;
    }
    roll_up(&mut items);

    let roots: Vec<&TestItem> = items.iter().filter(|i| i.parent_id.is_none() && !i.is_retry()).collect();
    launch.statistics = Statistics::sum(roots.iter().map(|i| &i.statistics));
    launch.status = if launch.end_time.is_some() {
        ItemStatus::aggregate(roots.iter().map(|i| i.status))
    } else {
        ItemStatus::InProgress
    };

    let mut uow = repository.begin().await?;
    uow.save_launch(&launch).await?;
    for item in &items {
        uow.save_test_item(item).await?;
    }
    uow.commit().await?;

    let retries = items.iter().filter(|i| i.is_retry()).count();
    info!(launch_id = %launch.id, items = items.len() - retries, retries, "Imported launch");
    Ok(ImportSummary {
        launch,
        items: items.len() - retries,
        retries,
    })
}

async fn next_number(repository: &dyn LaunchRepository, project: &str, name: &str) -> DomainResult<i64> {
    let existing = repository
        .list(LaunchFilter {
            project: Some(project.to_string()),
            name: Some(name.to_string()),
            include_retired: true,
            limit: None,
        })
        .await?;
    Ok(existing.iter().map(|l| l.number).max().unwrap_or(0) + 1)
}

/// Append `doc` and its subtree to `out`, parents first. Containers get
/// their status and counters later from [`roll_up`].
fn flatten(
    doc: &ItemDocument,
    launch: &Launch,
    parent: Option<&TestItem>,
    position: i64,
    default_start: DateTime<Utc>,
    out: &mut Vec<TestItem>,
) -> DomainResult<()> {
    let start = doc.start_time.unwrap_or(default_start);
    let status = if doc.children.is_empty() {
        doc.status.ok_or_else(|| {
            DomainError::ValidationFailed(format!("Leaf item '{}' has no status", doc.name))
        })?
    } else {
        ItemStatus::InProgress
    };

    let mut item = to_item(doc, launch, start, status);
    item = match parent {
        Some(p) => item.under(p, position),
        None => {
            item.position = position;
            item
        }
    };
    item.has_retries = !doc.retries.is_empty();
    out.push(item.clone());

    for attempt in &doc.retries {
        if !attempt.children.is_empty() || !attempt.retries.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "Retry of '{}' must be a plain item",
                doc.name
            )));
        }
        let status = attempt.status.ok_or_else(|| {
            DomainError::ValidationFailed(format!("Retry of '{}' has no status", doc.name))
        })?;
        let mut retry = to_item(attempt, launch, attempt.start_time.unwrap_or(start), status);
        retry.parent_id = item.parent_id;
        retry.position = position;
        retry.retry_of = Some(item.id);
        retry.path = match parent {
            Some(p) => format!("{}.{}", p.path, retry.id),
            None => retry.id.to_string(),
        };
        out.push(retry);
    }

    for (pos, child) in doc.children.iter().enumerate() {
        flatten(child, launch, Some(&item), pos as i64, start, out)?;
    }
    Ok(())
}

fn to_item(doc: &ItemDocument, launch: &Launch, start: DateTime<Utc>, status: ItemStatus) -> TestItem {
    let mut item = TestItem::new(launch.id, doc.name.clone(), doc.item_type, status, start);
    item.end_time = doc.end_time;
    item.description = doc.description.clone();
    item.unique_id = doc.unique_id.clone();
    item.code_ref = doc.code_ref.clone();
    item.parameters = doc.parameters.clone();
    item.attributes = doc.attributes.clone();
    item
}
