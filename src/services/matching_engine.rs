//! Matching engine.
//!
//! Decides which items of different source trees represent the same test
//! case. Matching runs level by level: two items can only match when their
//! parents were matched into the same group, so roots are matched first and
//! each group's children are matched against each other afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::{
    ItemRef, ItemTree, MatchKey, MatchKeyKind, MergeGroup, NodeIdx, TestItem,
};

/// Pure function computing the matching key of an item.
pub type KeyFn = Arc<dyn Fn(&TestItem) -> MatchKey + Send + Sync>;

/// Partitions items of several source trees into merge groups.
#[derive(Clone)]
pub struct MatchingEngine {
    key_fn: KeyFn,
    label: String,
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine").field("key", &self.label).finish()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(MatchKeyKind::default())
    }
}

impl MatchingEngine {
    /// Engine using one of the built-in key kinds.
    pub fn new(kind: MatchKeyKind) -> Self {
        Self {
            key_fn: Arc::new(move |item: &TestItem| key_for(kind, item)),
            label: kind.as_str().to_string(),
        }
    }

    /// Engine using a caller-supplied key function.
    pub fn with_key_fn<F>(label: impl Into<String>, key_fn: F) -> Self
    where
        F: Fn(&TestItem) -> MatchKey + Send + Sync + 'static,
    {
        Self {
            key_fn: Arc::new(key_fn),
            label: label.into(),
        }
    }

    /// Name of the key in use, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Key of `item`.
    pub fn key(&self, item: &TestItem) -> MatchKey {
        (self.key_fn)(item)
    }

    /// Match the root items of all trees. `trees` must be in chronological
    /// launch order.
    pub fn match_roots(&self, trees: &[ItemTree]) -> Vec<MergeGroup> {
        let candidates = trees
            .iter()
            .enumerate()
            .map(|(tree, t)| (tree, t.roots()));
        self.partition(trees, candidates, 0)
    }

    /// Match the children of every member of `parent` against each other.
    pub fn match_children(&self, trees: &[ItemTree], parent: &MergeGroup) -> Vec<MergeGroup> {
        let candidates = parent
            .members
            .iter()
            .map(|m| (m.tree, trees[m.tree].children(m.node)));
        self.partition(trees, candidates, parent.depth + 1)
    }

    /// Split candidate siblings into groups.
    ///
    /// Candidates are visited tree by tree in chronological order, siblings in
    /// stored order. The n-th occurrence of a key in one tree pairs with the
    /// n-th occurrence of that key in every other tree; anything without a
    /// counterpart ends up alone in its group. Groups are ordered by where
    /// they were first seen, which follows the earliest launch's sibling
    /// order.
    fn partition<'a, I>(&self, trees: &[ItemTree], candidates: I, depth: usize) -> Vec<MergeGroup>
    where
        I: Iterator<Item = (usize, &'a [NodeIdx])>,
    {
        let mut groups: Vec<MergeGroup> = Vec::new();
        let mut slots: HashMap<(MatchKey, usize), usize> = HashMap::new();

        for (tree, siblings) in candidates {
            let mut occurrences: HashMap<MatchKey, usize> = HashMap::new();
            for &node in siblings {
                let key = self.key(trees[tree].item(node));
                let occurrence = occurrences.entry(key.clone()).or_insert(0);
                let slot = (key.clone(), *occurrence);
                *occurrence += 1;

                let member = ItemRef { tree, node };
                match slots.get(&slot) {
                    Some(&group) => groups[group].members.push(member),
                    None => {
                        slots.insert(slot, groups.len());
                        groups.push(MergeGroup {
                            key,
                            depth,
                            members: vec![member],
                        });
                    }
                }
            }
        }

        groups
    }
}

/// Key of an item under a built-in key kind.
pub fn key_for(kind: MatchKeyKind, item: &TestItem) -> MatchKey {
    match kind {
        MatchKeyKind::NameAndType => name_and_type(item),
        MatchKeyKind::UniqueId => match &item.unique_id {
            Some(uid) => MatchKey::new(["uid", uid.as_str()]),
            None => name_and_type(item),
        },
        MatchKeyKind::CodeRef => match &item.code_ref {
            Some(code_ref) => MatchKey::new(["code", item.item_type.as_str(), code_ref.as_str()]),
            None => name_and_type(item),
        },
        MatchKeyKind::Parameters => {
            let mut params = item.parameters.clone();
            params.sort();
            let mut parts = vec![
                "params".to_string(),
                item.item_type.as_str().to_string(),
                item.name.clone(),
            ];
            parts.extend(params.into_iter().map(|p| format!("{}={}", p.key, p.value)));
            MatchKey::new(parts)
        }
    }
}

fn name_and_type(item: &TestItem) -> MatchKey {
    MatchKey::new(["name", item.item_type.as_str(), item.name.as_str()])
}
