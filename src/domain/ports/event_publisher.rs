//! Event collaborator port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::MergeCompletedEvent;

/// Receives completion signals of committed merges.
///
/// Publishing happens after the merge transaction committed, so a failing
/// publisher never undoes a merge.
#[async_trait]
pub trait MergeEventPublisher: Send + Sync {
    async fn publish(&self, event: &MergeCompletedEvent) -> DomainResult<()>;
}

/// A publisher that drops every event.
///
/// Use this when nothing listens for merge completions.
#[derive(Debug, Clone, Default)]
pub struct NullEventPublisher;

impl NullEventPublisher {
    /// Create the publisher.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MergeEventPublisher for NullEventPublisher {
    async fn publish(&self, _event: &MergeCompletedEvent) -> DomainResult<()> {
        Ok(())
    }
}
