//! Launch merge service: the entry point of the merge engine.
//!
//! A merge runs in four steps inside one unit of work: load the source
//! trees, match and fold them with the requested strategy, write the result
//! and retire the inputs. The launches involved stay locked for the whole
//! operation. The completion event is published after the commit.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ItemTree, Launch, MatchKeyKind, MergeCompletedEvent, MergeConfig, MergeRequest,
    MergeStrategyType, MergedTree,
};
use crate::domain::ports::{LaunchRepository, LaunchUnitOfWork, MergeEventPublisher};
use crate::services::launch_locks::LaunchLockRegistry;
use crate::services::matching_engine::MatchingEngine;
use crate::services::merge_commit::{CommitPlan, MergeCommitter};
use crate::services::strategy_registry::{MergeStrategy, StrategyRegistry};
use crate::services::tree_loader::TreeLoader;

/// Result of a committed merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Launch holding the merged tree.
    pub launch: Launch,
    /// Sources retired by the merge.
    pub retired_launch_ids: Vec<Uuid>,
    /// Strategy that ran.
    pub strategy: MergeStrategyType,
    /// Merged items saved, retries excluded.
    pub merged_items: usize,
    /// Retry items saved.
    pub retries: usize,
    /// Items of the target launch superseded by the merge result.
    pub replaced_items: u64,
    /// False when the completion event could not be delivered.
    pub event_published: bool,
}

struct Prepared {
    sources: Vec<Launch>,
    target: Option<Launch>,
    merged: MergedTree,
}

/// Entry point of the merge engine.
///
/// Validates a request, locks the launches it touches, loads their trees,
/// runs the strategy and commits the result through one unit of work.
/// The completion event is published after the commit.
pub struct LaunchMergeService<R: LaunchRepository> {
    repository: Arc<R>,
    registry: StrategyRegistry,
    publisher: Arc<dyn MergeEventPublisher>,
    locks: LaunchLockRegistry,
    matching: MatchingEngine,
}

impl<R: LaunchRepository> LaunchMergeService<R> {
    /// Service with the default matching and its own lock registry.
    pub fn new(
        repository: Arc<R>,
        registry: StrategyRegistry,
        publisher: Arc<dyn MergeEventPublisher>,
    ) -> Self {
        Self {
            repository,
            registry,
            publisher,
            locks: LaunchLockRegistry::new(),
            matching: MatchingEngine::default(),
        }
    }

    /// Build a service from the merge section of the configuration.
    pub fn from_config(
        repository: Arc<R>,
        config: &MergeConfig,
        publisher: Arc<dyn MergeEventPublisher>,
    ) -> DomainResult<Self> {
        let registry = StrategyRegistry::from_config(config)?;
        let kind = MatchKeyKind::from_str(&config.match_key).ok_or_else(|| {
            DomainError::ValidationFailed(format!("Unknown match key: {}", config.match_key))
        })?;
        Ok(Self::new(repository, registry, publisher).with_matching(MatchingEngine::new(kind)))
    }

    /// Share a lock registry with other services of the same process.
    pub fn with_locks(mut self, locks: LaunchLockRegistry) -> Self {
        self.locks = locks;
        self
    }

    /// Matching used when a request does not name a match key.
    pub fn with_matching(mut self, matching: MatchingEngine) -> Self {
        self.matching = matching;
        self
    }

    /// Strategies this service can run.
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Merge `launch_ids` with `strategy`, returning the resulting launch.
    ///
    /// The result replaces the tree of `target` when given; otherwise a new
    /// launch is created.
    pub async fn merge_launches(
        &self,
        strategy: MergeStrategyType,
        launch_ids: impl IntoIterator<Item = Uuid>,
        target: Option<Uuid>,
    ) -> DomainResult<Launch> {
        let mut request = MergeRequest::new(strategy, launch_ids);
        request.target_launch_id = target;
        Ok(self.merge(request).await?.launch)
    }

    /// Run a merge request end to end.
    #[instrument(skip(self, request), fields(strategy = %request.strategy, launches = request.launch_ids.len()))]
    pub async fn merge(&self, request: MergeRequest) -> DomainResult<MergeOutcome> {
        if request.launch_ids.len() < 2 {
            return Err(DomainError::NothingToMerge(format!(
                "a merge needs at least two distinct source launches, got {}",
                request.launch_ids.len()
            )));
        }

        let strategy = self.registry.resolve(request.strategy)?;
        let matching = match request.match_key {
            Some(kind) => MatchingEngine::new(kind),
            None => self.matching.clone(),
        };

        let guard = self.locks.acquire(&request.affected_launch_ids()).await;
        let mut uow = self.repository.begin().await?;

        let prepared = match Self::prepare(uow.as_mut(), &request, strategy, &matching).await {
            Ok(prepared) => prepared,
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback of aborted merge failed");
                }
                return Err(err);
            }
        };

        let plan = CommitPlan {
            merged: &prepared.merged,
            sources: &prepared.sources,
            target: prepared.target.as_ref(),
            request: &request,
        };
        let committed = MergeCommitter::commit(uow, plan).await?;
        drop(guard);

        let event = MergeCompletedEvent {
            result_launch_id: committed.launch.id,
            retired_launch_ids: committed.retired_launch_ids.clone(),
            strategy: strategy.kind(),
            merged_items: committed.saved_items,
            completed_at: Utc::now(),
        };
        let event_published = match self.publisher.publish(&event).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    launch_id = %committed.launch.id,
                    error = %err,
                    "Merge committed but the completion event was not published"
                );
                false
            }
        };

        info!(
            launch_id = %committed.launch.id,
            status = %committed.launch.status,
            retired = committed.retired_launch_ids.len(),
            "Merged launches"
        );

        Ok(MergeOutcome {
            launch: committed.launch,
            retired_launch_ids: committed.retired_launch_ids,
            strategy: strategy.kind(),
            merged_items: committed.saved_items,
            retries: committed.saved_retries,
            replaced_items: committed.replaced_items,
            event_published,
        })
    }

    async fn prepare(
        uow: &mut dyn LaunchUnitOfWork,
        request: &MergeRequest,
        strategy: MergeStrategy,
        matching: &MatchingEngine,
    ) -> DomainResult<Prepared> {
        let target = match request.target_launch_id {
            Some(id) => {
                let launch = uow
                    .find_launch_by_id(id)
                    .await?
                    .ok_or(DomainError::LaunchNotFound(id))?;
                if launch.retired {
                    return Err(DomainError::InvalidMergeRequest(format!(
                        "Target launch {id} is retired"
                    )));
                }
                Some(launch)
            }
            None => None,
        };

        let trees = TreeLoader::chronological(TreeLoader::load_trees(uow, &request.launch_ids).await?);
        validate_sources(&trees, target.as_ref())?;

        let merged = strategy.merge(&trees, matching)?;
        info!(
            merged_items = merged.len(),
            roots = merged.roots.len(),
            key = matching.label(),
            "Folded source trees"
        );

        Ok(Prepared {
            sources: trees.into_iter().map(|t| t.launch).collect(),
            target,
            merged,
        })
    }
}

/// Sources and target must share a project, and sources must have finished.
fn validate_sources(trees: &[ItemTree], target: Option<&Launch>) -> DomainResult<()> {
    let Some(first) = trees.first() else {
        return Err(DomainError::NothingToMerge("no source launches".to_string()));
    };
    let project = &first.launch.project;

    for launch in trees.iter().map(|t| &t.launch).chain(target) {
        if &launch.project != project {
            return Err(DomainError::InvalidMergeRequest(format!(
                "Launch {} belongs to project '{}', expected '{}'",
                launch.id, launch.project, project
            )));
        }
    }

    if let Some(running) = trees.iter().find(|t| !t.launch.is_finished()) {
        return Err(DomainError::InvalidMergeRequest(format!(
            "Launch {} is still in progress",
            running.launch.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteLaunchRepository};
    use crate::domain::models::{ItemStatus, LaunchMode};
    use crate::domain::ports::{LaunchFilter, NullEventPublisher};
    use crate::services::event_bus::EventBus;
    use crate::services::fixtures::LaunchFixture;
    use chrono::Duration;

    async fn setup() -> (Arc<SqliteLaunchRepository>, LaunchMergeService<SqliteLaunchRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteLaunchRepository::new(pool));
        let service = LaunchMergeService::new(
            repo.clone(),
            StrategyRegistry::with_defaults(),
            Arc::new(NullEventPublisher::new()),
        );
        (repo, service)
    }

    fn rerun_pair() -> (LaunchFixture, LaunchFixture) {
        let t0 = Utc::now() - Duration::hours(1);
        let mut first = LaunchFixture::new("Regression", t0).numbered(1);
        let suite = first.suite("Suite");
        first.step(suite, "TestA", ItemStatus::Failed);
        first.step(suite, "TestB", ItemStatus::Passed);

        let mut second = LaunchFixture::new("Regression", t0 + Duration::minutes(10)).numbered(2);
        let suite = second.suite("Suite");
        second.step(suite, "TestA", ItemStatus::Passed);
        (first, second)
    }

    #[tokio::test]
    async fn test_merge_creates_new_launch_and_retires_sources() {
        let (repo, service) = setup().await;
        let (first, second) = rerun_pair();
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        let request = MergeRequest::new(MergeStrategyType::Deep, [first.launch.id, second.launch.id])
            .with_description("nightly rerun");
        let outcome = service.merge(request).await.unwrap();

        let launch = outcome.launch;
        assert_eq!(launch.name, "Regression");
        assert_eq!(launch.number, 3);
        assert_eq!(launch.status, ItemStatus::Passed);
        assert_eq!(launch.statistics.total, 2);
        assert_eq!(launch.description.as_deref(), Some("nightly rerun"));
        assert_eq!(outcome.merged_items, 3);
        assert_eq!(outcome.retries, 2);
        assert!(outcome.event_published);

        let mut retired = outcome.retired_launch_ids.clone();
        retired.sort();
        let mut expected = vec![first.launch.id, second.launch.id];
        expected.sort();
        assert_eq!(retired, expected);

        let visible = repo.list(LaunchFilter::default()).await.unwrap();
        assert_eq!(visible.iter().map(|l| l.id).collect::<Vec<_>>(), vec![launch.id]);
        assert!(repo.get(first.launch.id).await.unwrap().unwrap().retired);
        assert!(repo.get_items(first.launch.id, false).await.unwrap().is_empty());
        assert_eq!(repo.get_items(first.launch.id, true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_merge_into_target_replaces_its_tree() {
        let (repo, service) = setup().await;
        let (first, second) = rerun_pair();
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        let launch = service
            .merge_launches(
                MergeStrategyType::Deep,
                [first.launch.id, second.launch.id],
                Some(second.launch.id),
            )
            .await
            .unwrap();

        assert_eq!(launch.id, second.launch.id);
        assert!(!repo.get(second.launch.id).await.unwrap().unwrap().retired);
        assert!(repo.get(first.launch.id).await.unwrap().unwrap().retired);

        let active = repo.get_items(second.launch.id, false).await.unwrap();
        let names: Vec<&str> = active.iter().filter(|i| !i.is_retry()).map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Suite", "TestA", "TestB"]);
        let all = repo.get_items(second.launch.id, true).await.unwrap();
        assert_eq!(all.len(), active.len() + 2);
    }

    #[tokio::test]
    async fn test_single_source_is_rejected_before_any_read() {
        let (_repo, service) = setup().await;
        let err = service
            .merge_launches(MergeStrategyType::Deep, [Uuid::new_v4()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NothingToMerge(_)));
    }

    #[tokio::test]
    async fn test_unregistered_strategy_fails() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteLaunchRepository::new(pool));
        let registry = StrategyRegistry::builder()
            .register(MergeStrategyType::Deep, crate::services::deep_merge::deep_merge)
            .unwrap()
            .build();
        let service = LaunchMergeService::new(repo, registry, Arc::new(NullEventPublisher::new()));

        let err = service
            .merge_launches(MergeStrategyType::Basic, [Uuid::new_v4(), Uuid::new_v4()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn test_sources_from_other_projects_are_rejected() {
        let (repo, service) = setup().await;
        let (first, mut second) = rerun_pair();
        second.launch.project = "other".to_string();
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        let err = service
            .merge_launches(MergeStrategyType::Deep, [first.launch.id, second.launch.id], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidMergeRequest(_)));
        assert!(!repo.get(first.launch.id).await.unwrap().unwrap().retired);
    }

    #[tokio::test]
    async fn test_running_source_is_rejected() {
        let (repo, service) = setup().await;
        let (first, mut second) = rerun_pair();
        second.launch.status = ItemStatus::InProgress;
        second.launch.end_time = None;
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        let err = service
            .merge_launches(MergeStrategyType::Deep, [first.launch.id, second.launch.id], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidMergeRequest(ref msg) if msg.contains("in progress")));
    }

    #[tokio::test]
    async fn test_retired_launch_cannot_be_merged_again() {
        let (repo, service) = setup().await;
        let (first, second) = rerun_pair();
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        service
            .merge_launches(MergeStrategyType::Deep, [first.launch.id, second.launch.id], None)
            .await
            .unwrap();
        let err = service
            .merge_launches(MergeStrategyType::Deep, [first.launch.id, second.launch.id], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidMergeRequest(_)));
    }

    #[tokio::test]
    async fn test_request_overrides_and_event() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteLaunchRepository::new(pool));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let service = LaunchMergeService::new(repo.clone(), StrategyRegistry::with_defaults(), bus.clone());

        let (first, second) = rerun_pair();
        first.persist(repo.as_ref()).await;
        second.persist(repo.as_ref()).await;

        let mut request = MergeRequest::new(MergeStrategyType::Basic, [first.launch.id, second.launch.id])
            .with_name("Combined");
        request.mode = Some(LaunchMode::Debug);
        let outcome = service.merge(request).await.unwrap();

        assert_eq!(outcome.launch.name, "Combined");
        assert_eq!(outcome.launch.mode, LaunchMode::Debug);
        assert_eq!(outcome.retries, 0);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload.result_launch_id, outcome.launch.id);
        assert_eq!(event.payload.strategy, MergeStrategyType::Basic);
        assert_eq!(event.payload.retired_launch_ids.len(), 2);
    }
}
