//! Box-drawing rendering of a launch's item tree.

use crate::domain::models::{ItemTree, NodeIdx};

use super::table::styled_status;

const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

/// Render every root of `tree` with its descendants.
///
/// Containers show their pass/fail counters; items with earlier attempts
/// show how many retries they absorbed.
pub fn render_item_tree(tree: &ItemTree) -> String {
    if tree.is_empty() {
        return "(no items)\n".to_string();
    }

    let mut output = String::new();
    let roots = tree.roots();
    for (i, &root) in roots.iter().enumerate() {
        render_node(tree, root, "", i == roots.len() - 1, &mut output);
    }
    output
}

fn render_node(tree: &ItemTree, idx: NodeIdx, prefix: &str, is_last: bool, output: &mut String) {
    let node = tree.node(idx);
    let item = &node.item;
    let connector = if is_last { TREE_LAST } else { TREE_BRANCH };

    let mut line = format!(
        "{}{}{} {} [{}]",
        prefix,
        connector,
        styled_status(item.status),
        item.name,
        item.item_type.as_str().to_lowercase()
    );
    if !node.children.is_empty() {
        let s = item.statistics;
        line.push_str(&format!(" {}/{} passed", s.passed, s.total));
        if s.failed > 0 {
            line.push_str(&format!(", {} failed", s.failed));
        }
    }
    if !node.retries.is_empty() {
        let plural = if node.retries.len() == 1 { "retry" } else { "retries" };
        line.push_str(&format!(" ({} {})", node.retries.len(), plural));
    }
    output.push_str(&line);
    output.push('\n');

    let child_prefix = format!("{}{}", prefix, if is_last { TREE_SPACE } else { TREE_PIPE });
    let children = &node.children;
    for (i, &child) in children.iter().enumerate() {
        render_node(tree, child, &child_prefix, i == children.len() - 1, output);
    }
}
