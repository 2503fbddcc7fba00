//! Launch Merge - test launch merge engine
//!
//! Test runs are often repeated: a flaky suite is rerun, or a failing subset
//! is retried in a follow-up launch. This crate folds such sibling launches
//! into one canonical execution record, keeping earlier attempts of each test
//! as retries of the final one.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): launch and item models, the merge model and port traits
//! - **Service Layer** (`services`): matching, merge strategies, commit and events
//! - **Adapters** (`adapters`): SQLite persistence of launches and events
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use launch_merge::adapters::sqlite::{create_migrated_test_pool, SqliteLaunchRepository};
//! use launch_merge::domain::models::{MergeConfig, MergeRequest, MergeStrategyType};
//! use launch_merge::domain::ports::NullEventPublisher;
//! use launch_merge::services::LaunchMergeService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repo = Arc::new(SqliteLaunchRepository::new(create_migrated_test_pool().await?));
//!     let service = LaunchMergeService::from_config(repo, &MergeConfig::default(), Arc::new(NullEventPublisher))?;
//!     let outcome = service.merge(MergeRequest::new(MergeStrategyType::Deep, [first, second])).await?;
//!     println!("merged into {}", outcome.launch.id);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, ItemStatus, ItemTree, ItemType, Launch, MatchKeyKind, MergeRequest, MergeStrategyType,
    MergedTree, TestItem,
};
pub use domain::ports::{LaunchRepository, LaunchUnitOfWork, MergeEventPublisher};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{LaunchMergeService, MatchingEngine, MergeOutcome, StrategyRegistry};
