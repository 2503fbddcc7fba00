//! Service layer: the merge engine and its supporting services.

pub mod basic_merge;
pub mod deep_merge;
pub mod event_bus;
pub mod event_store;
pub mod launch_import;
pub mod launch_locks;
pub mod launch_merge_service;
pub mod matching_engine;
pub mod merge_commit;
pub mod strategy_registry;
pub mod tree_loader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use event_bus::{EventBus, EventBusConfig, EventId, PublishedEvent, SequenceNumber};
pub use event_store::{EventQuery, EventStore, EventStoreError, InMemoryEventStore};
pub use launch_import::{import_launch, ImportSummary, ItemDocument, LaunchDocument};
pub use launch_locks::{LaunchLockRegistry, LaunchSetGuard};
pub use launch_merge_service::{LaunchMergeService, MergeOutcome};
pub use matching_engine::{key_for, KeyFn, MatchingEngine};
pub use merge_commit::{CommitOutcome, CommitPlan, MergeCommitter};
pub use strategy_registry::{MergeFn, MergeStrategy, StrategyRegistry, StrategyRegistryBuilder};
pub use tree_loader::TreeLoader;
