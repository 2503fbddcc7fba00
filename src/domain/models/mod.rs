//! Domain models for the launch merge engine.

pub mod config;
pub mod launch;
pub mod merge;
pub mod test_item;
pub mod tree;

pub use config::{Config, DatabaseConfig, LoggingConfig, MergeConfig};
pub use launch::{Launch, LaunchMode};
pub use merge::{
    ItemRef, MatchKey, MatchKeyKind, MergeCompletedEvent, MergeGroup, MergeRequest,
    MergeStrategyType, MergedIdx, MergedItem, MergedTree,
};
pub use test_item::{ItemAttribute, ItemParameter, ItemStatus, ItemType, Statistics, TestItem};
pub use tree::{roll_up, ItemTree, NodeIdx, TreeNode};
