//! End-to-end merge scenarios against the SQLite repository.
//!
//! Each test builds source launches, persists them, runs the merge service
//! and inspects what was committed.

mod common;

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use common::{
    base_time, child_named, launch_count, load_tree, merge_service, setup_repo, FailPoint,
    FailingPublisher, FailingRepository, LaunchBuilder,
};
use launch_merge::adapters::sqlite::{SqliteEventRepository, SqliteLaunchRepository};
use launch_merge::domain::models::{ItemAttribute, ItemStatus, MergeRequest, MergeStrategyType};
use launch_merge::domain::ports::{LaunchFilter, LaunchRepository};
use launch_merge::services::{EventBus, EventBusConfig, EventQuery, EventStore, LaunchMergeService, StrategyRegistry};
use launch_merge::DomainError;

/// Two runs of one suite: TestA passes first, then fails.
fn pass_then_fail() -> (LaunchBuilder, LaunchBuilder) {
    let t0 = base_time();
    let mut first = LaunchBuilder::new("Nightly", t0).number(1);
    let suite = first.suite("Suite");
    first.step(suite, "TestA", ItemStatus::Passed);

    let mut second = LaunchBuilder::new("Nightly", t0 + Duration::hours(1)).number(2);
    let suite = second.suite("Suite");
    second.step(suite, "TestA", ItemStatus::Failed);

    (first, second)
}

#[tokio::test]
async fn test_latest_attempt_wins_and_earlier_becomes_retry() {
    common::setup_test_logging();
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let service = merge_service(repo.clone());
    let outcome = service
        .merge(MergeRequest::new(MergeStrategyType::Deep, [l1, l2]))
        .await
        .expect("merge should succeed");

    let result = load_tree(repo.as_ref(), outcome.launch.id).await;
    assert_ne!(result.launch.id, l1);
    assert_ne!(result.launch.id, l2);
    assert_eq!(result.launch.status, ItemStatus::Failed);
    assert_eq!(result.launch.number, 3);
    assert_eq!(result.launch.statistics.total, 1);
    assert_eq!(result.launch.statistics.failed, 1);
    assert_eq!(result.launch.start_time, first.launch.start_time);
    assert_eq!(result.launch.end_time, second.launch.end_time);

    assert_eq!(result.roots().len(), 1);
    let suite = result.roots()[0];
    let test_a = child_named(&result, suite, "TestA");

    let first_a = first.items.iter().find(|i| i.name == "TestA").unwrap();
    let second_a = second.items.iter().find(|i| i.name == "TestA").unwrap();
    let merged_a = result.item(test_a);
    assert_eq!(merged_a.status, ItemStatus::Failed);
    assert_eq!(merged_a.start_time, first_a.start_time);
    assert_eq!(merged_a.end_time, second_a.end_time);
    assert!(merged_a.has_retries);

    let retries = &result.node(test_a).retries;
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].status, ItemStatus::Passed);
    assert_eq!(retries[0].start_time, first_a.start_time);
    assert_eq!(retries[0].retry_of, Some(merged_a.id));
    assert_eq!(retries[0].launch_id, outcome.launch.id);

    // Suite and TestA each keep the first launch's attempt.
    assert_eq!(result.node(suite).retries.len(), 1);
    assert_eq!(outcome.retries, 2);
    assert_eq!(outcome.merged_items, 2);
    assert!(outcome.event_published);
}

#[tokio::test]
async fn test_sources_are_retired_not_deleted() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let outcome = merge_service(repo.clone())
        .merge(MergeRequest::new(MergeStrategyType::Deep, [l1, l2]))
        .await
        .unwrap();

    let mut retired = outcome.retired_launch_ids.clone();
    retired.sort();
    let mut expected = vec![l1, l2];
    expected.sort();
    assert_eq!(retired, expected);

    for (id, status) in [(l1, ItemStatus::Passed), (l2, ItemStatus::Failed)] {
        let launch = repo.get(id).await.unwrap().expect("source still stored");
        assert!(launch.retired);
        assert_eq!(launch.status, status, "retiring keeps the launch status");
        assert!(repo.get_items(id, false).await.unwrap().is_empty(), "source items are retired");
        let stored = repo.get_items(id, true).await.unwrap();
        assert_eq!(stored.len(), 2, "source items are kept");
        assert!(stored.iter().all(|i| i.retired));
    }

    let visible = repo.list(LaunchFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, outcome.launch.id);
    assert_eq!(launch_count(repo.as_ref()).await, 3);
}

#[tokio::test]
async fn test_unmatched_item_is_carried_over() {
    let repo = setup_repo().await;
    let t0 = base_time();

    let mut first = LaunchBuilder::new("Nightly", t0);
    let suite = first.suite("Suite");
    first.step(suite, "TestA", ItemStatus::Failed);
    let test_b = first.step(suite, "TestB", ItemStatus::Passed);

    let mut second = LaunchBuilder::new("Nightly", t0 + Duration::hours(1));
    let suite = second.suite("Suite");
    second.step(suite, "TestA", ItemStatus::Passed);

    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let launch = merge_service(repo.clone())
        .merge_launches(MergeStrategyType::Deep, [l1, l2], None)
        .await
        .unwrap();

    let result = load_tree(repo.as_ref(), launch.id).await;
    let suite = result.roots()[0];
    let children: Vec<&str> = result
        .children(suite)
        .iter()
        .map(|&c| result.item(c).name.as_str())
        .collect();
    assert_eq!(children, vec!["TestA", "TestB"]);

    let merged_b = child_named(&result, suite, "TestB");
    let original_b = first.get(test_b);
    assert_eq!(result.item(merged_b).status, ItemStatus::Passed);
    assert_eq!(result.item(merged_b).start_time, original_b.start_time);
    assert_eq!(result.item(merged_b).end_time, original_b.end_time);
    assert!(result.node(merged_b).retries.is_empty());

    let merged_a = child_named(&result, suite, "TestA");
    assert_eq!(result.item(merged_a).status, ItemStatus::Passed);
    assert_eq!(result.node(merged_a).retries.len(), 1);

    assert_eq!(result.launch.status, ItemStatus::Passed);
    assert_eq!(result.launch.statistics.total, 2);
    assert_eq!(result.launch.statistics.passed, 2);
}

#[tokio::test]
async fn test_existing_retries_are_preserved() {
    let repo = setup_repo().await;
    let t0 = base_time();

    let mut first = LaunchBuilder::new("Nightly", t0);
    let suite = first.suite("Suite");
    let flaky = first.step(suite, "Flaky", ItemStatus::Passed);
    first.retry(flaky, ItemStatus::Failed);

    let mut second = LaunchBuilder::new("Nightly", t0 + Duration::hours(1));
    let suite = second.suite("Suite");
    second.step(suite, "Flaky", ItemStatus::Failed);

    let mut third = LaunchBuilder::new("Nightly", t0 + Duration::hours(2));
    let suite = third.suite("Suite");
    third.step(suite, "Flaky", ItemStatus::Passed);

    let ids = [
        first.persist(repo.as_ref()).await,
        second.persist(repo.as_ref()).await,
        third.persist(repo.as_ref()).await,
    ];

    let outcome = merge_service(repo.clone())
        .merge(MergeRequest::new(MergeStrategyType::Deep, ids))
        .await
        .unwrap();

    let result = load_tree(repo.as_ref(), outcome.launch.id).await;
    let flaky = child_named(&result, result.roots()[0], "Flaky");
    let retries = &result.node(flaky).retries;

    // One retry carried from the first launch plus one per earlier launch.
    assert_eq!(retries.len(), 3);
    let statuses: Vec<ItemStatus> = retries.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![ItemStatus::Failed, ItemStatus::Passed, ItemStatus::Failed]);
    assert!(retries.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    assert_eq!(result.item(flaky).status, ItemStatus::Passed);
    assert_eq!(outcome.retired_launch_ids.len(), 3);
}

#[tokio::test]
async fn test_single_launch_is_nothing_to_merge() {
    let repo = setup_repo().await;
    let (first, _) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let service = merge_service(repo.clone());

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l1], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NothingToMerge(_)));

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l1, l1], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NothingToMerge(_)), "duplicates collapse to one launch");

    assert_eq!(launch_count(repo.as_ref()).await, 1);
    assert!(!repo.get(l1).await.unwrap().unwrap().retired);
}

#[tokio::test]
async fn test_missing_launch_aborts_without_writes() {
    let repo = setup_repo().await;
    let (first, _) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let missing = Uuid::new_v4();

    let err = merge_service(repo.clone())
        .merge_launches(MergeStrategyType::Deep, [l1, missing], None)
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::LaunchNotFound(id) if id == missing));
    assert_eq!(launch_count(repo.as_ref()).await, 1);
    assert!(!repo.get(l1).await.unwrap().unwrap().retired);
}

#[tokio::test]
async fn test_disjoint_launches_are_nothing_to_merge_for_deep() {
    let repo = setup_repo().await;
    let t0 = base_time();
    let mut first = LaunchBuilder::new("Nightly", t0);
    first.suite("Alpha");
    let mut second = LaunchBuilder::new("Nightly", t0 + Duration::hours(1));
    second.suite("Beta");
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;
    let service = merge_service(repo.clone());

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l1, l2], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NothingToMerge(_)));
    assert_eq!(launch_count(repo.as_ref()).await, 2);

    // Basic merge places the trees side by side instead.
    let launch = service
        .merge_launches(MergeStrategyType::Basic, [l1, l2], None)
        .await
        .unwrap();
    let result = load_tree(repo.as_ref(), launch.id).await;
    let roots: Vec<&str> = result.roots().iter().map(|&r| result.item(r).name.as_str()).collect();
    assert_eq!(roots, vec!["Alpha", "Beta"]);
    assert_eq!(result.retry_count(), 0);
}

#[tokio::test]
async fn test_basic_merge_keeps_every_attempt() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let outcome = merge_service(repo.clone())
        .merge(MergeRequest::new(MergeStrategyType::Basic, [l1, l2]))
        .await
        .unwrap();

    assert_eq!(outcome.strategy, MergeStrategyType::Basic);
    let result = load_tree(repo.as_ref(), outcome.launch.id).await;
    assert_eq!(result.roots().len(), 2);
    assert_eq!(result.len(), 4);
    assert_eq!(result.retry_count(), 0);
    assert_eq!(result.launch.statistics.total, 2);
    assert_eq!(result.launch.status, ItemStatus::Failed);
}

#[tokio::test]
async fn test_target_launch_tree_is_replaced() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let mut request = MergeRequest::new(MergeStrategyType::Deep, [l1, l2])
        .with_target(l2)
        .with_name("Nightly (merged)");
    request.attributes.push(ItemAttribute::new("merged", "true"));

    let outcome = merge_service(repo.clone()).merge(request).await.unwrap();

    assert_eq!(outcome.launch.id, l2);
    assert_eq!(outcome.retired_launch_ids, vec![l1]);
    assert_eq!(outcome.replaced_items, 2);

    let target = repo.get(l2).await.unwrap().unwrap();
    assert!(!target.retired);
    assert_eq!(target.name, "Nightly (merged)");
    assert_eq!(target.status, ItemStatus::Failed);
    assert!(target.attributes.contains(&ItemAttribute::new("merged", "true")));
    assert!(repo.get(l1).await.unwrap().unwrap().retired);

    let active = repo.get_items(l2, false).await.unwrap();
    let all = repo.get_items(l2, true).await.unwrap();
    assert_eq!(active.len(), 4, "suite and test, each with one retry");
    assert_eq!(all.len(), 6, "the replaced items are retired, not deleted");
    assert!(repo.get_items(l1, false).await.unwrap().is_empty());
    assert_eq!(launch_count(repo.as_ref()).await, 2);
}

#[tokio::test]
async fn test_retired_target_is_rejected() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;
    let service = merge_service(repo.clone());
    service.merge_launches(MergeStrategyType::Deep, [l1, l2], None).await.unwrap();

    let (third, fourth) = pass_then_fail();
    let l3 = third.persist(repo.as_ref()).await;
    let l4 = fourth.persist(repo.as_ref()).await;

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l3, l4], Some(l1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidMergeRequest(_)));
    assert!(!repo.get(l3).await.unwrap().unwrap().retired);
}

#[tokio::test]
async fn test_retired_source_cannot_be_merged_again() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;
    let service = merge_service(repo.clone());
    let merged = service.merge_launches(MergeStrategyType::Deep, [l1, l2], None).await.unwrap();

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l1, merged.id], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidMergeRequest(ref msg) if msg.contains("already merged")));
    assert!(!repo.get(merged.id).await.unwrap().unwrap().retired);
}

#[tokio::test]
async fn test_invalid_sources_are_rejected() {
    let repo = setup_repo().await;
    let t0 = base_time();

    let mut ours = LaunchBuilder::new("Nightly", t0);
    let suite = ours.suite("Suite");
    ours.step(suite, "TestA", ItemStatus::Passed);
    let mut theirs = LaunchBuilder::new("Nightly", t0 + Duration::hours(1)).project("billing");
    let suite = theirs.suite("Suite");
    theirs.step(suite, "TestA", ItemStatus::Passed);
    let mut running = LaunchBuilder::new("Nightly", t0 + Duration::hours(2)).in_progress();
    let suite = running.suite("Suite");
    running.step(suite, "TestA", ItemStatus::InProgress);

    let ours = ours.persist(repo.as_ref()).await;
    let theirs = theirs.persist(repo.as_ref()).await;
    let running = running.persist(repo.as_ref()).await;
    let service = merge_service(repo.clone());

    let err = service
        .merge_launches(MergeStrategyType::Deep, [ours, theirs], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidMergeRequest(ref msg) if msg.contains("project")));

    let err = service
        .merge_launches(MergeStrategyType::Deep, [ours, running], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidMergeRequest(ref msg) if msg.contains("in progress")));

    assert_eq!(launch_count(repo.as_ref()).await, 3);
}

#[tokio::test]
async fn test_unregistered_strategy_is_rejected() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let registry = StrategyRegistry::builder()
        .register(MergeStrategyType::Basic, launch_merge::services::basic_merge::basic_merge)
        .unwrap()
        .build();
    let service = LaunchMergeService::new(
        repo.clone(),
        registry,
        Arc::new(launch_merge::domain::ports::NullEventPublisher::new()),
    );

    let err = service
        .merge_launches(MergeStrategyType::Deep, [l1, l2], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::UnknownStrategy(_)));
    assert_eq!(launch_count(repo.as_ref()).await, 2);
}

#[tokio::test]
async fn test_failed_commit_leaves_sources_untouched() {
    for fail_at in [
        FailPoint::SaveItem { after: 1 },
        FailPoint::MarkRetired,
        FailPoint::Commit,
    ] {
        let sqlite = setup_repo().await;
        let (first, second) = pass_then_fail();
        let l1 = first.persist(sqlite.as_ref()).await;
        let l2 = second.persist(sqlite.as_ref()).await;

        let repo = Arc::new(FailingRepository::new(SqliteLaunchRepository::clone(&sqlite), fail_at));
        let err = merge_service(repo.clone())
            .merge_launches(MergeStrategyType::Deep, [l1, l2], None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::MergeCommit(_)), "{fail_at:?}: got {err:?}");
        assert_eq!(repo.rollbacks(), 1, "{fail_at:?}");
        assert_eq!(launch_count(sqlite.as_ref()).await, 2, "{fail_at:?}: no result launch");
        for id in [l1, l2] {
            let launch = sqlite.get(id).await.unwrap().unwrap();
            assert!(!launch.retired, "{fail_at:?}: source must stay active");
            assert_eq!(sqlite.get_items(id, false).await.unwrap().len(), 2);
        }
    }
}

#[tokio::test]
async fn test_failed_commit_keeps_target_tree() {
    let sqlite = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(sqlite.as_ref()).await;
    let l2 = second.persist(sqlite.as_ref()).await;

    let repo = Arc::new(FailingRepository::new(SqliteLaunchRepository::clone(&sqlite), FailPoint::MarkRetired));
    let err = merge_service(repo)
        .merge_launches(MergeStrategyType::Deep, [l1, l2], Some(l2))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::MergeCommit(_)));
    assert_eq!(sqlite.get_items(l2, true).await.unwrap().len(), 2);
    assert_eq!(sqlite.get_items(l2, false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_publish_failure_does_not_undo_merge() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let publisher = Arc::new(FailingPublisher::default());
    let service = LaunchMergeService::new(repo.clone(), StrategyRegistry::with_defaults(), publisher.clone());

    let outcome = service
        .merge(MergeRequest::new(MergeStrategyType::Deep, [l1, l2]))
        .await
        .expect("publish failures are not merge failures");

    assert!(!outcome.event_published);
    assert_eq!(publisher.attempts(), 1);
    let stored = repo.get(outcome.launch.id).await.unwrap().expect("result committed");
    assert_eq!(stored.status, ItemStatus::Failed);
    assert!(repo.get(l1).await.unwrap().unwrap().retired);
}

#[tokio::test]
async fn test_completion_event_is_persisted() {
    let repo = setup_repo().await;
    let (first, second) = pass_then_fail();
    let l1 = first.persist(repo.as_ref()).await;
    let l2 = second.persist(repo.as_ref()).await;

    let store = Arc::new(SqliteEventRepository::new(repo.pool().clone()));
    let bus = Arc::new(EventBus::new(EventBusConfig::default()).with_store(store.clone()));
    let mut receiver = bus.subscribe();
    let service = LaunchMergeService::new(repo.clone(), StrategyRegistry::with_defaults(), bus.clone());

    let outcome = service
        .merge(MergeRequest::new(MergeStrategyType::Deep, [l1, l2]))
        .await
        .unwrap();
    assert!(outcome.event_published);

    let broadcast = receiver.recv().await.expect("event broadcast");
    assert_eq!(broadcast.payload.result_launch_id, outcome.launch.id);

    assert_eq!(store.count().await.unwrap(), 1);
    let events = store.query(EventQuery::new().launch_id(l1)).await.unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0].payload;
    assert_eq!(event.strategy, MergeStrategyType::Deep);
    assert_eq!(event.merged_items, 2);
    assert!(event.retired_launch_ids.contains(&l1));
    assert!(event.retired_launch_ids.contains(&l2));
}
