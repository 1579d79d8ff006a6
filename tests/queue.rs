mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::task::JoinSet;

use renewalwatch::check::{CheckJobStore, NewCheckJob};
use renewalwatch::queue::{InMemoryWorkQueue, NewWorkItem, WorkQueue, WorkStatus};

const KIND: &str = "insurance-check";

#[tokio::test]
async fn exactly_one_of_many_concurrent_claimers_wins() {
    let queue = Arc::new(InMemoryWorkQueue::new());
    queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let q = queue.clone();
        tasks.spawn(async move { q.claim_next(KIND).await.unwrap() });
    }

    let mut winners = 0;
    while let Some(res) = tasks.join_next().await {
        if res.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one claimer must receive the item");
}

#[tokio::test]
async fn deferred_item_is_not_claimable_before_not_before() {
    let queue = InMemoryWorkQueue::new();
    queue
        .enqueue(NewWorkItem::deferred(KIND, Utc::now() + Duration::hours(1)))
        .await
        .unwrap();

    assert!(queue.claim_next(KIND).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_tolerance_admits_items_just_over_the_horizon() {
    let queue = InMemoryWorkQueue::new().with_claim_tolerance(Duration::hours(3));
    queue
        .enqueue(NewWorkItem::deferred(KIND, Utc::now() + Duration::hours(1)))
        .await
        .unwrap();

    assert!(queue.claim_next(KIND).await.unwrap().is_some());
}

#[tokio::test]
async fn claims_follow_priority_then_creation_order() {
    let queue = InMemoryWorkQueue::new();

    let low = queue
        .enqueue(NewWorkItem {
            kind: KIND.to_string(),
            priority: 5,
            not_before: None,
        })
        .await
        .unwrap();
    let first_high = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    let second_high = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();

    let order: Vec<_> = [
        queue.claim_next(KIND).await.unwrap().unwrap().id,
        queue.claim_next(KIND).await.unwrap().unwrap().id,
        queue.claim_next(KIND).await.unwrap().unwrap().id,
    ]
    .to_vec();

    assert_eq!(order, vec![first_high, second_high, low]);
}

#[tokio::test]
async fn kinds_do_not_leak_into_each_other() {
    let queue = InMemoryWorkQueue::new();
    queue.enqueue(NewWorkItem::now("other-kind")).await.unwrap();

    assert!(queue.claim_next(KIND).await.unwrap().is_none());
}

#[tokio::test]
async fn complete_is_idempotent() {
    let queue = InMemoryWorkQueue::new();
    let id = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    queue.claim_next(KIND).await.unwrap().unwrap();

    queue.complete(id).await.unwrap();
    queue.complete(id).await.unwrap();

    let item = queue.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Completed.as_str());
    assert!(item.completed_at.is_some());
}

#[tokio::test]
async fn fail_records_error_and_bumps_retry_count() {
    let queue = InMemoryWorkQueue::new();
    let id = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    queue.claim_next(KIND).await.unwrap().unwrap();

    queue.fail(id, "payload missing").await.unwrap();

    let item = queue.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Failed.as_str());
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.last_error.as_deref(), Some("payload missing"));
}

#[tokio::test]
async fn reschedule_defers_and_preserves_resolved_payload() {
    let env = common::test_env();
    let queue = &env.queue;

    let item_id = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    let job_id = env
        .checks
        .create(NewCheckJob {
            work_item_id: item_id,
            tracking_id: None,
            plate_number: "10RL035".to_string(),
            target_date: Utc::now(),
        })
        .await
        .unwrap();

    env.checks
        .record_result(job_id, &common::covered("Pasha Sigorta"))
        .await
        .unwrap();

    queue.claim_next(KIND).await.unwrap().unwrap();
    queue
        .reschedule(item_id, Utc::now() + Duration::days(1), "registry rate limit")
        .await
        .unwrap();

    let item = queue.get(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Pending.as_str());
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.last_error.as_deref(), Some("registry rate limit"));
    assert!(item.not_before.unwrap() > Utc::now());

    // The resolved payload survives the reschedule untouched.
    let job = env.checks.get(job_id).await.unwrap().unwrap();
    assert!(job.is_resolved());
    assert_eq!(job.company.as_deref(), Some("Pasha Sigorta"));
}

#[tokio::test]
async fn stalled_processing_items_are_reclaimed() {
    let queue = InMemoryWorkQueue::new();
    let id = queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    queue.claim_next(KIND).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let reclaimed = queue.reclaim_stuck(Duration::zero()).await.unwrap();
    assert_eq!(reclaimed, 1);

    let item = queue.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Pending.as_str());
    assert_eq!(item.retry_count, 1);

    // And it is claimable again.
    assert!(queue.claim_next(KIND).await.unwrap().is_some());
}
