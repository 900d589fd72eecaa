//! End-to-end flows through the public queue surface on the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tasklease_core::domain::HistoryKind;
use tasklease_core::impls::InMemoryTaskStore;
use tasklease_core::ports::FixedClock;
use tasklease_core::{LeaseError, NewTask, QueueBuilder, TaskFilter, TaskQueue, TaskStatus};

fn queue() -> (TaskQueue, FixedClock) {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    let queue = QueueBuilder::new()
        .store(Arc::new(InMemoryTaskStore::new()))
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    (queue, clock)
}

#[tokio::test]
async fn claim_heartbeat_complete() {
    let (queue, clock) = queue();
    let lease = queue.lease();

    let added = lease
        .add(NewTask::new("A", "q", json!({"x": 1})).with_priority(5))
        .await
        .unwrap();
    assert_eq!(added.status, TaskStatus::Ready);

    let claimed = lease.claim("A", "w1", Some(Duration::from_secs(20))).await.unwrap();
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.owner.as_deref(), Some("w1"));

    clock.advance(chrono::Duration::seconds(5));
    let beat = lease.heartbeat("A", "w1", Some(0.5), None).await.unwrap();
    assert_eq!(beat.status, TaskStatus::Running);
    assert_eq!(beat.progress, 0.5);
    assert!(beat.deadline > claimed.deadline);

    assert_eq!(lease.complete("A").await.unwrap().status, TaskStatus::Completed);

    let task = queue.query().get("A").await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.spec, json!({"x": 1}));
    assert_eq!(task.history.len(), 1);
    assert_eq!(task.history[0].kind, HistoryKind::Assignment);
    assert_eq!(task.history[0].worker, "w1");
}

#[tokio::test]
async fn heartbeat_from_another_worker_is_refused() {
    let (queue, _) = queue();
    let lease = queue.lease();
    lease.add(NewTask::new("B", "q", json!({})).with_priority(1)).await.unwrap();
    lease.claim("B", "w1", None).await.unwrap();

    let err = lease.heartbeat("B", "w2", Some(0.1), None).await.unwrap_err();
    assert_eq!(err.to_string(), "Validation failed: Only owner can extend the heartbeat.");

    let task = queue.query().get("B").await.unwrap();
    assert_eq!(task.owner.as_deref(), Some("w1"));
    assert_eq!(task.progress, 0.0);
}

#[tokio::test]
async fn cancelled_task_cannot_be_claimed() {
    let (queue, _) = queue();
    let lease = queue.lease();
    lease.add(NewTask::new("C", "q", json!({})).with_priority(1)).await.unwrap();

    assert_eq!(lease.cancel("C").await.unwrap().status, TaskStatus::Cancelled);
    assert!(matches!(
        lease.claim("C", "w1", None).await,
        Err(LeaseError::InvalidState { status: TaskStatus::Cancelled, .. })
    ));
}

#[tokio::test]
async fn batch_claim_takes_the_highest_priorities() {
    let (queue, _) = queue();
    let lease = queue.lease();
    for (id, priority) in [("p100", 100), ("p120", 120), ("p127", 127)] {
        lease.add(NewTask::new(id, "single", json!({})).with_priority(priority)).await.unwrap();
    }

    let batch = lease
        .claim_batch("single", 2, "w1", Some(Duration::from_secs(20)))
        .await
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|t| t.status == TaskStatus::Running));
    let ids: Vec<&str> = batch.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["p127", "p120"]);

    let ready = queue
        .query()
        .list(&TaskFilter::new().queue("single").status(TaskStatus::Ready))
        .await
        .unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, "p100");
}

#[tokio::test]
async fn expired_task_is_reclaimable_after_one_sweep() {
    let (queue, clock) = queue();
    let lease = queue.lease();
    lease.add(NewTask::new("D", "q", json!({}))).await.unwrap();
    lease.claim("D", "w1", Some(Duration::from_secs(10))).await.unwrap();

    clock.advance(chrono::Duration::seconds(11));
    let report = queue.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.timed_out, vec!["D".to_string()]);

    assert!(matches!(
        lease.heartbeat("D", "w1", None, None).await,
        Err(LeaseError::InvalidState { status: TaskStatus::Ready, .. })
    ));
    let reclaimed = lease.claim("D", "w2", None).await.unwrap();
    let kinds: Vec<HistoryKind> = reclaimed.history.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![HistoryKind::Assignment, HistoryKind::Timeout, HistoryKind::Assignment]
    );
}

#[tokio::test]
async fn yielded_task_returns_to_the_queue_on_next_sweep() {
    let (queue, _) = queue();
    let lease = queue.lease();
    lease.add(NewTask::new("E", "q", json!({}))).await.unwrap();
    lease.claim("E", "w1", None).await.unwrap();
    lease.heartbeat("E", "w1", Some(0.3), None).await.unwrap();

    let yielded = lease.yield_task("E").await.unwrap();
    assert_eq!(yielded.status, TaskStatus::Running);

    queue.sweeper().sweep_once().await.unwrap();
    let task = queue.query().get("E").await.unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert!(task.owner.is_none());
    assert_eq!(task.history.last().unwrap().progress, Some(0.3));
}

#[tokio::test]
async fn list_filters_by_worker() {
    let (queue, _) = queue();
    let lease = queue.lease();
    for id in ["a", "b", "c"] {
        lease.add(NewTask::new(id, "q", json!({}))).await.unwrap();
    }
    lease.claim("a", "w1", None).await.unwrap();
    lease.claim("b", "w2", None).await.unwrap();

    let mine = queue.query().list(&TaskFilter::new().worker("w1")).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "a");

    let counts = queue.query().counts(None).await.unwrap();
    assert_eq!((counts.ready, counts.running), (1, 2));
}
