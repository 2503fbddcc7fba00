//! Commit step: persists a merged tree and retires its inputs.
//!
//! Source launches other than the target are retired along with their items;
//! nothing is deleted.

use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ItemAttribute, Launch, MergeRequest, MergedIdx, MergedTree, TestItem};
use crate::domain::ports::LaunchUnitOfWork;
use crate::services::deep_merge::merge_attributes;

/// What a successful commit produced.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The launch holding the merged tree.
    pub launch: Launch,
    /// Sources flagged retired.
    pub retired_launch_ids: Vec<Uuid>,
    /// Merged items saved, retries excluded.
    pub saved_items: usize,
    /// Retry items saved.
    pub saved_retries: usize,
    /// Items of the target launch flagged retired because the merge replaced them.
    pub replaced_items: u64,
}

/// Everything the commit step needs besides the unit of work.
#[derive(Debug, Clone, Copy)]
pub struct CommitPlan<'a> {
    /// The merged tree to store.
    pub merged: &'a MergedTree,
    /// Source launches, oldest first.
    pub sources: &'a [Launch],
    /// Launch whose tree is replaced, if any.
    pub target: Option<&'a Launch>,
    /// The originating request.
    pub request: &'a MergeRequest,
}

/// Writes a merged tree through a unit of work.
pub struct MergeCommitter;

impl MergeCommitter {
    /// Apply `plan` through `uow` and commit it.
    ///
    /// Either every write becomes visible or none does: on failure the unit
    /// of work is rolled back and the error is reported as
    /// [`DomainError::MergeCommit`].
    pub async fn commit(
        mut uow: Box<dyn LaunchUnitOfWork>,
        plan: CommitPlan<'_>,
    ) -> DomainResult<CommitOutcome> {
        match Self::apply(uow.as_mut(), plan).await {
            Ok(outcome) => {
                uow.commit().await.map_err(DomainError::into_commit_error)?;
                info!(
                    launch_id = %outcome.launch.id,
                    items = outcome.saved_items,
                    retries = outcome.saved_retries,
                    retired = outcome.retired_launch_ids.len(),
                    "Committed merge"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed merge commit failed");
                }
                Err(err.into_commit_error())
            }
        }
    }

    /// Write the merge result without committing.
    pub async fn apply(
        uow: &mut dyn LaunchUnitOfWork,
        plan: CommitPlan<'_>,
    ) -> DomainResult<CommitOutcome> {
        let Some(latest) = plan.sources.last() else {
            return Err(DomainError::MergeCommit("no source launches to commit".to_string()));
        };

        let mut replaced_items = 0;
        let mut launch = match plan.target {
            Some(target) => {
                replaced_items = uow.retire_launch_items(target.id).await?;
                let mut launch = target.clone();
                if let Some(name) = &plan.request.name {
                    launch.name = name.clone();
                }
                launch
            }
            None => {
                let number = plan.sources.iter().map(|l| l.number).max().unwrap_or(0) + 1;
                let mut launch = Launch::new(
                    latest.project.clone(),
                    plan.request.name.clone().unwrap_or_else(|| latest.name.clone()),
                    latest.start_time,
                )
                .with_number(number);
                launch.mode = latest.mode;
                launch.description = latest.description.clone();
                launch
            }
        };

        let mut attribute_lists: Vec<&[ItemAttribute]> = Vec::new();
        if let Some(target) = plan.target {
            attribute_lists.push(target.attributes.as_slice());
        }
        attribute_lists.extend(plan.sources.iter().map(|l| l.attributes.as_slice()));
        attribute_lists.push(plan.request.attributes.as_slice());
        launch.attributes = merge_attributes(attribute_lists);

        if let Some(description) = &plan.request.description {
            launch.description = Some(description.clone());
        }
        if let Some(mode) = plan.request.mode {
            launch.mode = mode;
        }
        launch.status = plan.merged.status();
        launch.statistics = plan.merged.statistics();
        launch.start_time = plan
            .merged
            .start_time()
            .into_iter()
            .chain(plan.sources.iter().map(|l| l.start_time))
            .min()
            .unwrap_or(latest.start_time);
        launch.end_time = plan
            .merged
            .end_time()
            .into_iter()
            .chain(plan.sources.iter().filter_map(|l| l.end_time))
            .max();
        launch.retired = false;

        uow.save_launch(&launch).await?;

        let (saved_items, saved_retries) = Self::save_tree(uow, plan.merged, launch.id).await?;

        let mut retired_launch_ids = Vec::new();
        for source in plan.sources {
            if plan.target.is_some_and(|t| t.id == source.id) {
                continue;
            }
            uow.mark_launch_retired(source.id).await?;
            uow.retire_launch_items(source.id).await?;
            retired_launch_ids.push(source.id);
        }

        Ok(CommitOutcome {
            launch,
            retired_launch_ids,
            saved_items,
            saved_retries,
            replaced_items,
        })
    }

    /// Persist the merged items under `launch_id` with fresh identities,
    /// parents before children.
    async fn save_tree(
        uow: &mut dyn LaunchUnitOfWork,
        merged: &MergedTree,
        launch_id: Uuid,
    ) -> DomainResult<(usize, usize)> {
        let mut placed: HashMap<MergedIdx, (Uuid, String)> = HashMap::with_capacity(merged.len());
        let mut saved_items = 0;
        let mut saved_retries = 0;

        for idx in merged.preorder() {
            let node = &merged.nodes[idx];
            let parent = node.parent.and_then(|p| placed.get(&p)).cloned();
            let position = match node.parent {
                Some(p) => merged.nodes[p].children.iter().position(|&c| c == idx),
                None => merged.roots.iter().position(|&r| r == idx),
            }
            .unwrap_or(0) as i64;

            let item = relocate(&node.item, launch_id, parent.as_ref(), position);
            uow.save_test_item(&item).await?;
            saved_items += 1;

            for retry in &node.retries {
                let mut retry = relocate(retry, launch_id, parent.as_ref(), position);
                retry.retry_of = Some(item.id);
                retry.has_retries = false;
                uow.save_test_item(&retry).await?;
                saved_retries += 1;
            }

            placed.insert(idx, (item.id, item.path));
        }

        Ok((saved_items, saved_retries))
    }
}

/// Copy `source` into the result launch under a new ID.
fn relocate(
    source: &TestItem,
    launch_id: Uuid,
    parent: Option<&(Uuid, String)>,
    position: i64,
) -> TestItem {
    let mut item = source.clone();
    item.id = Uuid::new_v4();
    item.launch_id = launch_id;
    item.position = position;
    item.retry_of = None;
    item.retired = false;
    match parent {
        Some((parent_id, parent_path)) => {
            item.parent_id = Some(*parent_id);
            item.path = format!("{}.{}", parent_path, item.id);
        }
        None => {
            item.parent_id = None;
            item.path = item.id.to_string();
        }
    }
    item
}
