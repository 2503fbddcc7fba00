//! Merge domain model: strategy identifiers, merge groups and merged output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::launch::LaunchMode;
use super::test_item::{ItemAttribute, ItemStatus, Statistics, TestItem};
use super::tree::NodeIdx;

/// Identifier of a merge algorithm resolved through the strategy registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyType {
    /// Match items across launches and fold each match into one item.
    Deep,
    /// Place all source trees side by side under one launch without matching.
    Basic,
}

impl Default for MergeStrategyType {
    fn default() -> Self {
        Self::Deep
    }
}

impl MergeStrategyType {
    /// Name used in configuration and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deep => "deep",
            Self::Basic => "basic",
        }
    }

    /// Parse a strategy name, failing with [`DomainError::UnknownStrategy`].
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.to_lowercase().as_str() {
            "deep" => Ok(Self::Deep),
            "basic" => Ok(Self::Basic),
            _ => Err(DomainError::UnknownStrategy(s.to_string())),
        }
    }
}

impl std::fmt::Display for MergeStrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which item properties decide that two items are the same test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKeyKind {
    /// Item name and type.
    NameAndType,
    /// Agent-reported unique ID, falling back to name and type.
    UniqueId,
    /// Code reference path, falling back to name and type.
    CodeRef,
    /// Name, type and the sorted parameter list.
    Parameters,
}

impl Default for MatchKeyKind {
    fn default() -> Self {
        Self::NameAndType
    }
}

impl MatchKeyKind {
    /// Name used in configuration and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameAndType => "name_and_type",
            Self::UniqueId => "unique_id",
            Self::CodeRef => "code_ref",
            Self::Parameters => "parameters",
        }
    }

    /// Parse a key name. Accepts dashes and the short aliases `name` and `path`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "name_and_type" | "name" => Some(Self::NameAndType),
            "unique_id" => Some(Self::UniqueId),
            "code_ref" | "path" => Some(Self::CodeRef),
            "parameters" => Some(Self::Parameters),
            _ => None,
        }
    }
}

/// Opaque matching key. Two items match when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchKey(Vec<String>);

impl MatchKey {
    /// Build a key from its parts, compared in order.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// The key's parts.
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Reference to a node of one of the source trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemRef {
    /// Index of the source tree, in chronological launch order.
    pub tree: usize,
    /// Node within that tree.
    pub node: NodeIdx,
}

/// Items from different source trees judged to be the same test case.
///
/// Members share depth and key, hold at most one item per source tree, and
/// are ordered oldest launch first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroup {
    /// Key shared by every member.
    pub key: MatchKey,
    /// Tree depth of the members; roots are at depth 0.
    pub depth: usize,
    /// At most one member per source tree, oldest launch first.
    pub members: Vec<ItemRef>,
}

impl MergeGroup {
    /// True when the item has no counterpart in another launch.
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// Number of distinct source trees contributing to the group.
    pub fn source_count(&self) -> usize {
        self.members.iter().map(|m| m.tree).collect::<BTreeSet<_>>().len()
    }
}

/// Index of a node inside a [`MergedTree`].
pub type MergedIdx = usize;

/// One item of the merged output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedItem {
    /// Resulting item. `id`, `launch_id`, `parent_id` and `path` are
    /// placeholders until the commit step assigns final identities.
    pub item: TestItem,
    /// Parent node, `None` for roots.
    pub parent: Option<MergedIdx>,
    /// Child nodes in merged sibling order.
    pub children: Vec<MergedIdx>,
    /// IDs of every source item folded into this one, oldest first.
    pub contributors: Vec<Uuid>,
    /// Superseded attempts kept as retry history, oldest first.
    pub retries: Vec<TestItem>,
}

impl MergedItem {
    /// IDs of the source items recorded as retries of this item.
    pub fn retry_of(&self) -> Vec<Uuid> {
        self.retries.iter().map(|r| r.id).collect()
    }
}

/// Output of a merge strategy: a single tree built from several launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTree {
    /// Strategy that produced the tree.
    pub strategy: MergeStrategyType,
    /// Source launches, oldest first.
    pub source_launch_ids: Vec<Uuid>,
    /// Arena of merged items.
    pub nodes: Vec<MergedItem>,
    /// Root nodes in merged order.
    pub roots: Vec<MergedIdx>,
}

impl MergedTree {
    /// Empty tree for `source_launch_ids`.
    pub fn new(strategy: MergeStrategyType, source_launch_ids: Vec<Uuid>) -> Self {
        Self {
            strategy,
            source_launch_ids,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Append a node and link it under `parent`, returning its index.
    pub fn push(&mut self, mut node: MergedItem, parent: Option<MergedIdx>) -> MergedIdx {
        let idx = self.nodes.len();
        node.parent = parent;
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    /// Node indices in pre-order.
    pub fn preorder(&self) -> Vec<MergedIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<MergedIdx> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev().copied());
        }
        order
    }

    /// Sum of the root counters.
    pub fn statistics(&self) -> Statistics {
        Statistics::sum(self.roots.iter().map(|&r| &self.nodes[r].item.statistics))
    }

    /// Aggregate status of the merged roots.
    pub fn status(&self) -> ItemStatus {
        ItemStatus::aggregate(self.roots.iter().map(|&r| self.nodes[r].item.status))
    }

    /// Earliest root start.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.roots.iter().map(|&r| self.nodes[r].item.start_time).min()
    }

    /// Latest root end, if any root has finished.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.roots.iter().filter_map(|&r| self.nodes[r].item.end_time).max()
    }

    /// True when every non-leaf node's counters equal the sum of its children's.
    pub fn counters_consistent(&self) -> bool {
        self.nodes.iter().all(|node| {
            node.children.is_empty()
                || node.item.statistics
                    == Statistics::sum(node.children.iter().map(|&c| &self.nodes[c].item.statistics))
        })
    }

    /// Number of merged items, retries excluded.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing was merged.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A request to merge launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Strategy to run.
    pub strategy: MergeStrategyType,
    /// Source launches; duplicates collapse.
    pub launch_ids: BTreeSet<Uuid>,
    /// Launch whose tree is replaced by the merge result; a new launch is
    /// created when absent.
    pub target_launch_id: Option<Uuid>,
    /// Name of a new result launch; defaults to the latest source's name.
    pub name: Option<String>,
    /// Description of the result launch.
    pub description: Option<String>,
    /// Mode of the result launch.
    pub mode: Option<LaunchMode>,
    /// Extra attributes added to the resulting launch.
    pub attributes: Vec<ItemAttribute>,
    /// Overrides the configured match key for this request.
    pub match_key: Option<MatchKeyKind>,
}

impl MergeRequest {
    /// Request merging `launch_ids` with `strategy` into a new launch.
    pub fn new<I>(strategy: MergeStrategyType, launch_ids: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        Self {
            strategy,
            launch_ids: launch_ids.into_iter().collect(),
            target_launch_id: None,
            name: None,
            description: None,
            mode: None,
            attributes: Vec::new(),
            match_key: None,
        }
    }

    /// Replace the tree of an existing launch instead of creating one.
    pub fn with_target(mut self, target: Uuid) -> Self {
        self.target_launch_id = Some(target);
        self
    }

    /// Name the result launch.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Describe the result launch.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Match items by `kind` instead of the configured key.
    pub fn with_match_key(mut self, kind: MatchKeyKind) -> Self {
        self.match_key = Some(kind);
        self
    }

    /// Every launch the merge touches: sources plus the target.
    pub fn affected_launch_ids(&self) -> BTreeSet<Uuid> {
        let mut ids = self.launch_ids.clone();
        ids.extend(self.target_launch_id);
        ids
    }
}

/// Completion signal emitted once a merge has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCompletedEvent {
    /// Launch holding the merged tree.
    pub result_launch_id: Uuid,
    /// Sources retired by the merge.
    pub retired_launch_ids: Vec<Uuid>,
    /// Strategy that ran.
    pub strategy: MergeStrategyType,
    /// Number of merged items saved, retries excluded.
    pub merged_items: usize,
    /// Commit time.
    pub completed_at: DateTime<Utc>,
}
