//! Tree loader.
//!
//! Loads the launches of a merge and their item trees through an open unit
//! of work, so the trees are read inside the same transaction that later
//! writes the merge result.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ItemTree;
use crate::domain::ports::LaunchUnitOfWork;

/// Reads source launches and their active item trees for a merge.
pub struct TreeLoader;

impl TreeLoader {
    /// Load the item tree of every launch in `launch_ids`.
    ///
    /// Fails with [`DomainError::LaunchNotFound`] for the first missing
    /// launch, and with [`DomainError::InvalidMergeRequest`] when a launch
    /// was already retired by an earlier merge.
    pub async fn load_trees(
        uow: &mut dyn LaunchUnitOfWork,
        launch_ids: &BTreeSet<Uuid>,
    ) -> DomainResult<BTreeMap<Uuid, ItemTree>> {
        let mut launches = Vec::with_capacity(launch_ids.len());
        for &id in launch_ids {
            let launch = uow
                .find_launch_by_id(id)
                .await?
                .ok_or(DomainError::LaunchNotFound(id))?;
            if launch.retired {
                return Err(DomainError::InvalidMergeRequest(format!(
                    "Launch {id} was already merged into another launch"
                )));
            }
            launches.push(launch);
        }

        let ids: Vec<Uuid> = launch_ids.iter().copied().collect();
        let mut items = uow.find_trees_by_launch_ids(&ids).await?;

        let mut trees = BTreeMap::new();
        for launch in launches {
            let id = launch.id;
            let tree = ItemTree::from_items(launch, items.remove(&id).unwrap_or_default())?;
            debug!(launch_id = %id, items = tree.len(), retries = tree.retry_count(), "Loaded item tree");
            trees.insert(id, tree);
        }

        info!(launches = trees.len(), "Loaded source trees");
        Ok(trees)
    }

    /// Order trees oldest launch first.
    pub fn chronological(trees: BTreeMap<Uuid, ItemTree>) -> Vec<ItemTree> {
        let mut ordered: Vec<ItemTree> = trees.into_values().collect();
        ordered.sort_by_key(|t| t.launch.chronology_key());
        ordered
    }
}
