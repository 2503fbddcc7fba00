//! Launch repository port.
//!
//! The merge engine reads and writes launches exclusively through these
//! traits. A [`LaunchUnitOfWork`] groups every read and write of one merge
//! into a single atomic transaction.

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Launch, TestItem};

/// Filter criteria for listing launches.
#[derive(Debug, Clone, Default)]
pub struct LaunchFilter {
    /// Only launches of this project.
    pub project: Option<String>,
    /// Only launches with this exact name.
    pub name: Option<String>,
    /// Include launches retired by earlier merges.
    pub include_retired: bool,
    /// At most this many launches, newest first.
    pub limit: Option<i64>,
}

/// A transactional unit of work over launches and their items.
///
/// Dropping a unit of work without calling [`commit`](Self::commit) discards
/// every write made through it.
#[async_trait]
pub trait LaunchUnitOfWork: Send {
    /// Get a launch by ID, retired or not.
    async fn find_launch_by_id(&mut self, id: Uuid) -> DomainResult<Option<Launch>>;

    /// Get the active (non-retired) items of each requested launch, including
    /// retry items. Launches without items map to an empty list.
    async fn find_trees_by_launch_ids(
        &mut self,
        launch_ids: &[Uuid],
    ) -> DomainResult<BTreeMap<Uuid, Vec<TestItem>>>;

    /// Insert or update a launch.
    async fn save_launch(&mut self, launch: &Launch) -> DomainResult<()>;

    /// Insert or update a test item.
    async fn save_test_item(&mut self, item: &TestItem) -> DomainResult<()>;

    /// Flag a launch as retired. Its items are left to `retire_launch_items`.
    async fn mark_launch_retired(&mut self, launch_id: Uuid) -> DomainResult<()>;

    /// Flag every active item of a launch as retired, returning how many were.
    async fn retire_launch_items(&mut self, launch_id: Uuid) -> DomainResult<u64>;

    /// Make every write of this unit of work visible at once.
    async fn commit(self: Box<Self>) -> DomainResult<()>;

    /// Discard every write of this unit of work.
    async fn rollback(self: Box<Self>) -> DomainResult<()>;
}

/// Repository interface for launch persistence.
#[async_trait]
pub trait LaunchRepository: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> DomainResult<Box<dyn LaunchUnitOfWork>>;

    /// Get a launch by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Launch>>;

    /// List launches, newest first.
    async fn list(&self, filter: LaunchFilter) -> DomainResult<Vec<Launch>>;

    /// Get the items of a launch in tree order (parents before children).
    async fn get_items(&self, launch_id: Uuid, include_retired: bool) -> DomainResult<Vec<TestItem>>;
}
