//! Port trait definitions (Hexagonal Architecture)
//!
//! These traits are the only way the merge engine touches the outside world:
//! - LaunchRepository / LaunchUnitOfWork: transactional launch persistence
//! - MergeEventPublisher: completion notifications

pub mod event_publisher;
pub mod launch_repository;

pub use event_publisher::{MergeEventPublisher, NullEventPublisher};
pub use launch_repository::{LaunchFilter, LaunchRepository, LaunchUnitOfWork};
