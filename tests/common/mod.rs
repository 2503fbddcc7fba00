//! Common test utilities for integration tests
//!
//! Provides launch builders, repositories and collaborators shared by the
//! merge integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use launch_merge::adapters::sqlite::{create_migrated_test_pool, SqliteLaunchRepository};
use launch_merge::domain::models::{
    roll_up, ItemStatus, ItemTree, ItemType, Launch, MergeCompletedEvent, Statistics, TestItem,
};
use launch_merge::domain::ports::{
    LaunchFilter, LaunchRepository, LaunchUnitOfWork, MergeEventPublisher, NullEventPublisher,
};
use launch_merge::services::{LaunchMergeService, StrategyRegistry};
use launch_merge::{DomainError, DomainResult};

pub const PROJECT: &str = "checkout";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Repository over a fresh in-memory database.
pub async fn setup_repo() -> Arc<SqliteLaunchRepository> {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test database");
    Arc::new(SqliteLaunchRepository::new(pool))
}

/// Merge service with the default strategies and no event listener.
pub fn merge_service<R: LaunchRepository>(repo: Arc<R>) -> LaunchMergeService<R> {
    LaunchMergeService::new(
        repo,
        StrategyRegistry::with_defaults(),
        Arc::new(NullEventPublisher::new()),
    )
}

/// A fixed point in time so runs are reproducible.
pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// Builds one launch with its item tree for the integration tests.
///
/// Each item starts one second after the previous one and runs for one
/// second. Container statistics and statuses are derived from the leaves.
/// Unlike the crate's unit-test fixture, the launch row it produces carries
/// the status and counters of its tree, the way an imported launch does, and
/// its project and lifecycle can be varied to exercise request validation.
pub struct LaunchBuilder {
    pub launch: Launch,
    pub items: Vec<TestItem>,
    clock: DateTime<Utc>,
}

impl LaunchBuilder {
    pub fn new(name: &str, start: DateTime<Utc>) -> Self {
        Self {
            launch: Launch::new(PROJECT, name, start)
                .finished(ItemStatus::Passed, start + Duration::minutes(5)),
            items: Vec::new(),
            clock: start,
        }
    }

    pub fn number(mut self, number: i64) -> Self {
        self.launch.number = number;
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.launch.project = project.to_string();
        self
    }

    pub fn in_progress(mut self) -> Self {
        self.launch.status = ItemStatus::InProgress;
        self.launch.end_time = None;
        self
    }

    pub fn suite(&mut self, name: &str) -> Uuid {
        self.add(None, name, ItemType::Suite, ItemStatus::Passed)
    }

    pub fn step(&mut self, parent: Uuid, name: &str, status: ItemStatus) -> Uuid {
        self.add(Some(parent), name, ItemType::Step, status)
    }

    pub fn add(&mut self, parent: Option<Uuid>, name: &str, item_type: ItemType, status: ItemStatus) -> Uuid {
        self.clock += Duration::seconds(1);
        let position = self
            .items
            .iter()
            .filter(|i| i.parent_id == parent && !i.is_retry())
            .count() as i64;
        let mut item = TestItem::new(self.launch.id, name, item_type, status, self.clock)
            .with_end_time(self.clock + Duration::seconds(1));
        match parent {
            Some(pid) => {
                let parent_item = self.get(pid).clone();
                item = item.under(&parent_item, position);
            }
            None => item.position = position,
        }
        let id = item.id;
        self.items.push(item);
        id
    }

    /// Record an earlier attempt of `item` inside this launch.
    pub fn retry(&mut self, item: Uuid, status: ItemStatus) -> Uuid {
        let target = self.get(item).clone();
        let mut retry = TestItem::new(
            self.launch.id,
            target.name.clone(),
            target.item_type,
            status,
            target.start_time - Duration::milliseconds(500),
        );
        retry.parent_id = target.parent_id;
        retry.path = match target.path.rsplit_once('.') {
            Some((ancestors, _)) => format!("{ancestors}.{}", retry.id),
            None => retry.id.to_string(),
        };
        retry.position = target.position;
        retry.retry_of = Some(item);
        let id = retry.id;
        self.items.push(retry);
        if let Some(t) = self.items.iter_mut().find(|i| i.id == item) {
            t.has_retries = true;
        }
        id
    }

    pub fn get(&self, id: Uuid) -> &TestItem {
        self.items.iter().find(|i| i.id == id).expect("builder item")
    }

    /// Items with statistics and container statuses filled in bottom-up.
    pub fn finished_items(&self) -> Vec<TestItem> {
        let mut items = self.items.clone();
        roll_up(&mut items);
        items
    }

    /// The launch row with status and counters taken from its root items.
    pub fn finished_launch(&self) -> Launch {
        let items = self.finished_items();
        let roots: Vec<&TestItem> = items.iter().filter(|i| i.parent_id.is_none() && !i.is_retry()).collect();
        let mut launch = self.launch.clone();
        launch.statistics = Statistics::sum(roots.iter().map(|i| &i.statistics));
        if launch.end_time.is_some() {
            launch.status = ItemStatus::aggregate(roots.iter().map(|i| i.status));
        }
        launch
    }

    pub fn tree(&self) -> ItemTree {
        ItemTree::from_items(self.finished_launch(), self.finished_items()).expect("builder tree")
    }

    /// Store the launch and its items, returning the launch ID.
    pub async fn persist(&self, repo: &dyn LaunchRepository) -> Uuid {
        let mut uow = repo.begin().await.expect("begin");
        uow.save_launch(&self.finished_launch()).await.expect("save launch");
        for item in self.finished_items() {
            uow.save_test_item(&item).await.expect("save item");
        }
        uow.commit().await.expect("commit");
        self.launch.id
    }
}

/// Load the active tree of a launch.
pub async fn load_tree(repo: &dyn LaunchRepository, launch_id: Uuid) -> ItemTree {
    let launch = repo
        .get(launch_id)
        .await
        .expect("get launch")
        .expect("launch exists");
    let items = repo.get_items(launch_id, false).await.expect("get items");
    ItemTree::from_items(launch, items).expect("valid tree")
}

/// Find the single node named `name` among the children of `parent`.
pub fn child_named(tree: &ItemTree, parent: usize, name: &str) -> usize {
    let matches: Vec<usize> = tree
        .children(parent)
        .iter()
        .copied()
        .filter(|&c| tree.item(c).name == name)
        .collect();
    assert_eq!(matches.len(), 1, "expected exactly one child named {name}");
    matches[0]
}

pub async fn launch_count(repo: &dyn LaunchRepository) -> usize {
    repo.list(LaunchFilter {
        include_retired: true,
        ..LaunchFilter::default()
    })
    .await
    .expect("list launches")
    .len()
}

/// Where a [`FailingRepository`] unit of work gives out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SaveItem { after: usize },
    MarkRetired,
    Commit,
}

/// Delegates to SQLite but fails one write of every unit of work.
pub struct FailingRepository {
    inner: SqliteLaunchRepository,
    fail_at: FailPoint,
    rollbacks: Arc<AtomicUsize>,
}

impl FailingRepository {
    pub fn new(inner: SqliteLaunchRepository, fail_at: FailPoint) -> Self {
        Self {
            inner,
            fail_at,
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LaunchRepository for FailingRepository {
    async fn begin(&self) -> DomainResult<Box<dyn LaunchUnitOfWork>> {
        Ok(Box::new(FailingUnitOfWork {
            inner: self.inner.begin().await?,
            fail_at: self.fail_at,
            saved_items: 0,
            rollbacks: self.rollbacks.clone(),
        }))
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Launch>> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: LaunchFilter) -> DomainResult<Vec<Launch>> {
        self.inner.list(filter).await
    }

    async fn get_items(&self, launch_id: Uuid, include_retired: bool) -> DomainResult<Vec<TestItem>> {
        self.inner.get_items(launch_id, include_retired).await
    }
}

struct FailingUnitOfWork {
    inner: Box<dyn LaunchUnitOfWork>,
    fail_at: FailPoint,
    saved_items: usize,
    rollbacks: Arc<AtomicUsize>,
}

fn injected(what: &str) -> DomainError {
    DomainError::DatabaseError(format!("injected failure: {what}"))
}

#[async_trait]
impl LaunchUnitOfWork for FailingUnitOfWork {
    async fn find_launch_by_id(&mut self, id: Uuid) -> DomainResult<Option<Launch>> {
        self.inner.find_launch_by_id(id).await
    }

    async fn find_trees_by_launch_ids(
        &mut self,
        launch_ids: &[Uuid],
    ) -> DomainResult<BTreeMap<Uuid, Vec<TestItem>>> {
        self.inner.find_trees_by_launch_ids(launch_ids).await
    }

    async fn save_launch(&mut self, launch: &Launch) -> DomainResult<()> {
        self.inner.save_launch(launch).await
    }

    async fn save_test_item(&mut self, item: &TestItem) -> DomainResult<()> {
        if let FailPoint::SaveItem { after } = self.fail_at {
            if self.saved_items >= after {
                return Err(injected("save_test_item"));
            }
        }
        self.saved_items += 1;
        self.inner.save_test_item(item).await
    }

    async fn mark_launch_retired(&mut self, launch_id: Uuid) -> DomainResult<()> {
        if self.fail_at == FailPoint::MarkRetired {
            return Err(injected("mark_launch_retired"));
        }
        self.inner.mark_launch_retired(launch_id).await
    }

    async fn retire_launch_items(&mut self, launch_id: Uuid) -> DomainResult<u64> {
        self.inner.retire_launch_items(launch_id).await
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        if self.fail_at == FailPoint::Commit {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback().await?;
            return Err(injected("commit"));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> DomainResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

/// A publisher whose delivery always fails.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    attempts: AtomicUsize,
}

impl FailingPublisher {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MergeEventPublisher for FailingPublisher {
    async fn publish(&self, _event: &MergeCompletedEvent) -> DomainResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::DatabaseError("event store unavailable".to_string()))
    }
}
