mod common;

use std::sync::Arc;

use chrono::{Timelike, Utc};

use common::{covered, test_env, test_runner, Scripted, ScriptedRegistry};
use renewalwatch::check::{CheckJobStore, NewCheckJob};
use renewalwatch::queue::{NewWorkItem, WorkQueue, WorkStatus};

const KIND: &str = "insurance-check";

#[tokio::test]
async fn rate_limited_lookup_reschedules_to_tomorrow_off_peak() {
    let env = test_env();
    let runner = test_runner(
        &env,
        Arc::new(ScriptedRegistry::new(vec![Scripted::RateLimited])),
    );

    let item_id = env.queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
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

    let processed = runner.drain().await;
    assert_eq!(processed, 1);

    // Back to pending, deferred to tomorrow at the off-peak hour, counted as
    // a retry but never as a failure.
    let item = env.queue.get(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Pending.as_str());
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.last_error.as_deref(), Some("registry rate limit"));
    let resume = item.not_before.expect("reschedule must set not_before");
    assert!(resume > Utc::now());
    assert_eq!(resume.hour(), 6);

    // The payload stays unresolved; the lookup never happened.
    let job = env.checks.get(job_id).await.unwrap().unwrap();
    assert!(!job.is_resolved());
}

#[tokio::test]
async fn transient_errors_retry_then_succeed_within_budget() {
    let env = test_env();
    let runner = test_runner(
        &env,
        Arc::new(ScriptedRegistry::new(vec![
            Scripted::Error("connection reset".to_string()),
            Scripted::Error("connection reset".to_string()),
            Scripted::Resolved(covered("Pasha Sigorta")),
        ])),
    );

    let item_id = env.queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    env.checks
        .create(NewCheckJob {
            work_item_id: item_id,
            tracking_id: None,
            plate_number: "90HB986".to_string(),
            target_date: Utc::now(),
        })
        .await
        .unwrap();

    // Zero retry base in the test config, so one drain sees all attempts.
    runner.drain().await;

    let item = env.queue.get(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Completed.as_str());
    assert_eq!(item.retry_count, 2);

    let job = env.checks.find_by_work_item(item_id).await.unwrap().unwrap();
    assert!(job.is_resolved());
    assert_eq!(job.company.as_deref(), Some("Pasha Sigorta"));
}

#[tokio::test]
async fn retry_budget_exhaustion_fails_the_item() {
    let env = test_env();
    let runner = test_runner(
        &env,
        Arc::new(ScriptedRegistry::new(vec![
            Scripted::Error("boom".to_string()),
            Scripted::Error("boom".to_string()),
            Scripted::Error("boom".to_string()),
        ])),
    );

    let item_id = env.queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();
    env.checks
        .create(NewCheckJob {
            work_item_id: item_id,
            tracking_id: None,
            plate_number: "90HB986".to_string(),
            target_date: Utc::now(),
        })
        .await
        .unwrap();

    runner.drain().await;

    let item = env.queue.get(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Failed.as_str());
    assert!(item.last_error.unwrap().contains("boom"));
}

#[tokio::test]
async fn work_item_without_payload_is_failed_not_retried() {
    let env = test_env();
    let runner = test_runner(&env, Arc::new(ScriptedRegistry::new(vec![])));

    let orphan = env.queue.enqueue(NewWorkItem::now(KIND)).await.unwrap();

    runner.drain().await;

    let item = env.queue.get(orphan).await.unwrap().unwrap();
    assert_eq!(item.status, WorkStatus::Failed.as_str());
    assert_eq!(item.last_error.as_deref(), Some("payload missing"));
}
