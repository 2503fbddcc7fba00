//! Arena representation of a launch's execution tree.
//!
//! Nodes are stored in a flat vector and linked by index, so navigation works
//! in both directions without shared ownership. Retry attempts are not tree
//! nodes; they hang off the node they were superseded by.

use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::launch::Launch;
use super::test_item::{ItemStatus, Statistics, TestItem};

/// Index of a node inside an [`ItemTree`].
pub type NodeIdx = usize;

/// A test item together with its tree links.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// The item itself.
    pub item: TestItem,
    /// Parent node, `None` for roots.
    pub parent: Option<NodeIdx>,
    /// Children in persisted sibling order.
    pub children: Vec<NodeIdx>,
    /// Earlier attempts of this item, oldest first.
    pub retries: Vec<TestItem>,
    /// Distance from the root; roots are at depth 0.
    pub depth: usize,
}

/// The item tree of one launch.
#[derive(Debug, Clone)]
pub struct ItemTree {
    /// Launch the items belong to.
    pub launch: Launch,
    nodes: Vec<TreeNode>,
    roots: Vec<NodeIdx>,
}

impl ItemTree {
    /// Build a tree from the flat list of a launch's active items.
    ///
    /// Siblings are ordered by persisted position, then start time, then ID.
    /// Every item must be reachable: an item whose parent or retry target is
    /// missing is reported as an error instead of being dropped.
    pub fn from_items(launch: Launch, items: Vec<TestItem>) -> DomainResult<Self> {
        let (retries, mut main): (Vec<TestItem>, Vec<TestItem>) =
            items.into_iter().partition(TestItem::is_retry);

        main.sort_by(|a, b| {
            (a.position, a.start_time, a.id).cmp(&(b.position, b.start_time, b.id))
        });

        let index: HashMap<Uuid, NodeIdx> = main
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.id, idx))
            .collect();

        let mut parents = Vec::with_capacity(main.len());
        for item in &main {
            let parent = match item.parent_id {
                Some(pid) => Some(*index.get(&pid).ok_or_else(|| {
                    DomainError::DatabaseError(format!(
                        "Item {} of launch {} references missing parent {}",
                        item.id, launch.id, pid
                    ))
                })?),
                None => None,
            };
            parents.push(parent);
        }

        let mut nodes: Vec<TreeNode> = main
            .into_iter()
            .zip(parents)
            .map(|(item, parent)| TreeNode {
                item,
                parent,
                children: Vec::new(),
                retries: Vec::new(),
                depth: 0,
            })
            .collect();

        let mut roots = Vec::new();
        for idx in 0..nodes.len() {
            match nodes[idx].parent {
                Some(parent) => nodes[parent].children.push(idx),
                None => roots.push(idx),
            }
        }

        let mut retries = retries;
        retries.sort_by(|a, b| (a.start_time, a.id).cmp(&(b.start_time, b.id)));
        for retry in retries {
            let Some(target) = retry.retry_of.and_then(|id| index.get(&id).copied()) else {
                return Err(DomainError::DatabaseError(format!(
                    "Retry {} of launch {} references missing item {:?}",
                    retry.id, launch.id, retry.retry_of
                )));
            };
            nodes[target].retries.push(retry);
        }

        let mut tree = Self { launch, nodes, roots };
        tree.assign_depths()?;
        Ok(tree)
    }

    /// Compute depths top-down; fails if some node is not reachable from a root.
    fn assign_depths(&mut self) -> DomainResult<()> {
        let mut visited = 0usize;
        let mut stack: Vec<(NodeIdx, usize)> = self.roots.iter().map(|&r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            visited += 1;
            self.nodes[idx].depth = depth;
            stack.extend(self.nodes[idx].children.iter().map(|&c| (c, depth + 1)));
        }

        if visited != self.nodes.len() {
            return Err(DomainError::DatabaseError(format!(
                "Item tree of launch {} contains a parent cycle",
                self.launch.id
            )));
        }
        Ok(())
    }

    /// Root nodes in sibling order.
    pub fn roots(&self) -> &[NodeIdx] {
        &self.roots
    }

    /// Node at `idx`.
    pub fn node(&self, idx: NodeIdx) -> &TreeNode {
        &self.nodes[idx]
    }

    /// Item at `idx`.
    pub fn item(&self, idx: NodeIdx) -> &TestItem {
        &self.nodes[idx].item
    }

    /// Children of `idx` in sibling order.
    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.nodes[idx].children
    }

    /// Number of nodes, retries excluded.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a launch without items.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node indices in pre-order (roots first, siblings in order).
    pub fn preorder(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeIdx> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev().copied());
        }
        order
    }

    /// Indices of leaf nodes in pre-order.
    pub fn leaves(&self) -> Vec<NodeIdx> {
        self.preorder()
            .into_iter()
            .filter(|&idx| self.nodes[idx].children.is_empty())
            .collect()
    }

    /// Retries across all nodes.
    pub fn retry_count(&self) -> usize {
        self.nodes.iter().map(|n| n.retries.len()).sum()
    }
}

/// Derive container counters and statuses from the leaves, in place.
///
/// `items` must list parents before their children. Leaves and retries keep
/// their own status and count once; retries never roll up into a parent.
pub fn roll_up(items: &mut [TestItem]) {
    let mut children: HashMap<Uuid, (Vec<Statistics>, Vec<ItemStatus>)> = HashMap::new();
    for item in items.iter_mut().rev() {
        if item.is_retry() {
            item.statistics = Statistics::for_leaf(item.status);
            continue;
        }
        match children.remove(&item.id) {
            Some((stats, statuses)) => {
                item.statistics = Statistics::sum(stats.iter());
                item.status = ItemStatus::aggregate(statuses);
            }
            None => item.statistics = Statistics::for_leaf(item.status),
        }
        if let Some(parent) = item.parent_id {
            let entry = children.entry(parent).or_default();
            entry.0.push(item.statistics);
            entry.1.push(item.status);
        }
    }
}
