//! Basic merge strategy.
//!
//! Places every source tree under the resulting launch side by side: no
//! matching happens, so each root keeps its own subtree unchanged.

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ItemRef, ItemTree, MergeGroup, MergeStrategyType, MergedTree};
use crate::services::deep_merge::fold_group;
use crate::services::matching_engine::MatchingEngine;

/// Place the source trees side by side under one launch.
///
/// Every root becomes its own group, so nothing is matched or retried.
/// Needs at least two trees.
pub fn basic_merge(trees: &[ItemTree], matching: &MatchingEngine) -> DomainResult<MergedTree> {
    if trees.len() < 2 {
        return Err(DomainError::NothingToMerge(format!(
            "basic merge needs at least two source launches, got {}",
            trees.len()
        )));
    }

    let mut out = MergedTree::new(
        MergeStrategyType::Basic,
        trees.iter().map(|t| t.launch.id).collect(),
    );
    for (tree_idx, tree) in trees.iter().enumerate() {
        for &root in tree.roots() {
            let group = MergeGroup {
                key: matching.key(tree.item(root)),
                depth: 0,
                members: vec![ItemRef { tree: tree_idx, node: root }],
            };
            fold_group(trees, matching, &group, None, &mut out);
        }
    }

    debug!(merged_items = out.len(), roots = out.roots.len(), "Basic merge concatenated source trees");
    Ok(out)
}
