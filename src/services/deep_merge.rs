//! Deep merge strategy.
//!
//! Folds every merge group into one item, descending into children before
//! computing a parent's counters. Precedence rules:
//!
//! - a leaf takes its status from the latest member, while a container's
//!   status is the aggregate of its merged children;
//! - name, description and identifiers come from the latest member;
//! - the merged span runs from the earliest start to the latest end;
//! - attributes are unioned, the latest member winning on collisions;
//! - counters are recomputed from the merged children;
//! - earlier members become retries of the merged item.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ItemAttribute, ItemStatus, ItemTree, MergeGroup, MergeStrategyType, MergedIdx, MergedItem,
    MergedTree, Statistics, TestItem,
};
use crate::services::matching_engine::MatchingEngine;

/// Merge source trees, matching items level by level.
///
/// Fails with [`DomainError::NothingToMerge`] unless at least one root item
/// has a counterpart in another launch.
pub fn deep_merge(trees: &[ItemTree], matching: &MatchingEngine) -> DomainResult<MergedTree> {
    if trees.len() < 2 {
        return Err(DomainError::NothingToMerge(format!(
            "deep merge needs at least two source launches, got {}",
            trees.len()
        )));
    }

    let roots = matching.match_roots(trees);
    let matched = roots.iter().filter(|g| g.source_count() > 1).count();
    if matched == 0 {
        return Err(DomainError::NothingToMerge(
            "no root item has a counterpart in another launch".to_string(),
        ));
    }

    let mut out = MergedTree::new(
        MergeStrategyType::Deep,
        trees.iter().map(|t| t.launch.id).collect(),
    );
    for group in &roots {
        fold_group(trees, matching, group, None, &mut out);
    }

    debug!(
        root_groups = roots.len(),
        matched_roots = matched,
        merged_items = out.len(),
        key = matching.label(),
        "Deep merge folded source trees"
    );
    Ok(out)
}

/// Fold `group` and its whole subtree into `out` under `parent`.
pub(crate) fn fold_group(
    trees: &[ItemTree],
    matching: &MatchingEngine,
    group: &MergeGroup,
    parent: Option<MergedIdx>,
    out: &mut MergedTree,
) -> MergedIdx {
    let node = if group.is_singleton() {
        adopt(trees, group)
    } else {
        combine(trees, group)
    };
    let idx = out.push(node, parent);

    for child in matching.match_children(trees, group) {
        fold_group(trees, matching, &child, Some(idx), out);
    }

    let node = &out.nodes[idx];
    let (statistics, status) = if node.children.is_empty() {
        (Statistics::for_leaf(node.item.status), node.item.status)
    } else {
        (
            Statistics::sum(node.children.iter().map(|&c| &out.nodes[c].item.statistics)),
            ItemStatus::aggregate(node.children.iter().map(|&c| out.nodes[c].item.status)),
        )
    };
    out.nodes[idx].item.statistics = statistics;
    out.nodes[idx].item.status = status;
    idx
}

/// A group without counterparts keeps its member as is.
fn adopt(trees: &[ItemTree], group: &MergeGroup) -> MergedItem {
    let member = group.members[0];
    let source = trees[member.tree].node(member.node);
    MergedItem {
        item: source.item.clone(),
        parent: None,
        children: Vec::new(),
        contributors: vec![source.item.id],
        retries: source.retries.clone(),
    }
}

fn combine(trees: &[ItemTree], group: &MergeGroup) -> MergedItem {
    let members: Vec<&TestItem> = group
        .members
        .iter()
        .map(|m| trees[m.tree].item(m.node))
        .collect();
    let latest = members[members.len() - 1];

    let mut item = latest.clone();
    item.start_time = members.iter().map(|m| m.start_time).min().unwrap_or(latest.start_time);
    item.end_time = members.iter().filter_map(|m| m.end_time).max();
    item.description = members.iter().rev().find_map(|m| m.description.clone());
    item.attributes = merge_attributes(members.iter().map(|m| m.attributes.as_slice()));

    let mut retries: Vec<TestItem> = Vec::new();
    for (member, source) in group.members.iter().zip(&members) {
        retries.extend(trees[member.tree].node(member.node).retries.iter().cloned());
        if source.id != latest.id {
            retries.push(as_retry(source));
        }
    }
    retries.sort_by(|a, b| (a.start_time, a.id).cmp(&(b.start_time, b.id)));
    item.has_retries = !retries.is_empty();

    MergedItem {
        item,
        parent: None,
        children: Vec::new(),
        contributors: members.iter().map(|m| m.id).collect(),
        retries,
    }
}

/// A superseded attempt, detached from its old tree position.
fn as_retry(source: &TestItem) -> TestItem {
    let mut retry = source.clone();
    retry.has_retries = false;
    retry
}

/// Union attribute lists given oldest first.
///
/// Keyed attributes collide within their namespace (system or user) on key;
/// the later value replaces the earlier one in place. Tags are deduplicated.
pub(crate) fn merge_attributes<'a, I>(lists: I) -> Vec<ItemAttribute>
where
    I: IntoIterator<Item = &'a [ItemAttribute]>,
{
    let mut merged: Vec<ItemAttribute> = Vec::new();
    let mut seen: HashMap<(bool, Option<String>, Option<String>), usize> = HashMap::new();

    for attribute in lists.into_iter().flatten() {
        let (system, key, tag) = attribute.merge_identity();
        let identity = (system, key.map(str::to_string), tag.map(str::to_string));
        match seen.get(&identity) {
            Some(&pos) => merged[pos] = attribute.clone(),
            None => {
                seen.insert(identity, merged.len());
                merged.push(attribute.clone());
            }
        }
    }
    merged
}
