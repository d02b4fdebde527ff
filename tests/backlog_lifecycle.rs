//! Backlog state machine against a real SQLite file.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use chrono::Utc;
use tablescout::backlog::{BacklogConfig, BacklogScheduler, ErrorClass};
use tablescout::fetcher::FetchError;
use tablescout::models::{BacklogTask, RetryPolicy, TaskStatus, TaskType};
use tablescout::pipeline::AttemptError;
use tablescout::repository::{BacklogRepository, RepositoryError};
use tempfile::tempdir;

fn scheduler(db: &std::path::Path) -> BacklogScheduler {
    let config = BacklogConfig {
        retry: RetryPolicy {
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::ZERO,
        },
        ..BacklogConfig::default()
    };
    BacklogScheduler::new(BacklogRepository::new(db).unwrap(), config)
}

#[test]
fn dequeue_order_is_priority_then_age() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tablescout.db");
    let repo = BacklogRepository::new(&db).unwrap();
    let t0 = Utc::now() - chrono::Duration::hours(1);

    for (id, priority, offset) in [("A", 5, 1), ("B", 5, 0), ("C", 9, 5)] {
        let task = BacklogTask::new("https://example.com", id, TaskType::Text)
            .with_task_id(id)
            .with_priority(priority)
            .with_created_at(t0 + chrono::Duration::minutes(offset));
        repo.enqueue(&task).unwrap();
    }

    let scheduler = scheduler(&db);
    let mut order = Vec::new();
    while let Some(task) = scheduler.claim_next(None).unwrap() {
        order.push(task.task_id);
    }
    assert_eq!(order, vec!["C", "B", "A"]);
}

#[test]
fn three_transient_failures_end_in_failed() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    let task = scheduler
        .enqueue_url("https://slow.test", "Slow", TaskType::Text, None, None)
        .unwrap()
        .unwrap();

    for attempt in 1..=3 {
        let mut claimed = scheduler.claim_next(None).unwrap().unwrap();
        assert_eq!(claimed.task_id, task.task_id);
        let class = scheduler.fail(&mut claimed, &AttemptError::Timeout(300)).unwrap();
        assert_eq!(class, ErrorClass::Transient);

        let stored = scheduler.get(&task.task_id).unwrap().unwrap();
        assert_eq!(stored.retry_count, attempt);
        assert!(stored.retry_count <= stored.max_retries);
        if attempt < 3 {
            assert_eq!(stored.status, TaskStatus::Pending);
        } else {
            assert_eq!(stored.status, TaskStatus::Failed);
        }
    }

    assert!(scheduler.claim_next(None).unwrap().is_none());
    let stored = scheduler.get(&task.task_id).unwrap().unwrap();
    assert_eq!(stored.error_messages.len(), 3);
}

#[test]
fn permanent_failure_fails_without_consuming_retries() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    scheduler
        .enqueue_url("https://gone.test", "Gone", TaskType::Text, None, None)
        .unwrap();

    let mut task = scheduler.claim_next(None).unwrap().unwrap();
    let err = AttemptError::Fetch(FetchError::Status {
        status: 404,
        url: "https://gone.test".to_string(),
    });
    assert_eq!(scheduler.fail(&mut task, &err).unwrap(), ErrorClass::Permanent);

    let stored = scheduler.get(&task.task_id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.retry_count, 0);
}

#[test]
fn persistence_failure_leaves_retry_count_alone() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    scheduler
        .enqueue_url("https://locked.test", "Locked", TaskType::Text, None, None)
        .unwrap();

    let mut task = scheduler.claim_next(None).unwrap().unwrap();
    let err = AttemptError::Persistence(RepositoryError::NotFound("restaurant 9".to_string()));
    assert_eq!(scheduler.fail(&mut task, &err).unwrap(), ErrorClass::Persistence);

    let stored = scheduler.get(&task.task_id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(stored.retry_count, 0);
    assert_eq!(stored.persistence_failures, 1);
}

#[test]
fn fresh_failures_create_then_increment_one_task() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    let low = AttemptError::LowQuality { score: 0.12 };

    let first = scheduler
        .record_fresh_failure("https://thin.test", "Thin", TaskType::Text, Some(1), &low)
        .unwrap();
    assert_eq!(first.status, TaskStatus::Pending);
    assert_eq!(first.retry_count, 0);
    assert_eq!(first.error_messages.len(), 1);

    let second = scheduler
        .record_fresh_failure("https://thin.test", "Thin", TaskType::Text, Some(1), &low)
        .unwrap();
    assert_eq!(second.task_id, first.task_id);
    assert_eq!(second.retry_count, 1);

    let stats = scheduler.stats().unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.retries_pending, 1);
}

#[test]
fn duplicate_enqueue_for_active_url_is_skipped() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    assert!(scheduler
        .enqueue_url("https://dup.test", "Dup", TaskType::Text, None, None)
        .unwrap()
        .is_some());
    assert!(scheduler
        .enqueue_url("https://dup.test", "Dup", TaskType::Text, None, None)
        .unwrap()
        .is_none());
    assert!(scheduler
        .enqueue_url("https://dup.test", "Dup", TaskType::Images, None, None)
        .unwrap()
        .is_some());
}

#[test]
fn racing_claimers_get_exactly_one_task() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tablescout.db");
    scheduler(&db)
        .enqueue_url("https://race.test", "Race", TaskType::Text, None, None)
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = db.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let scheduler = scheduler(&db);
                barrier.wait();
                scheduler.claim_next(None).unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Option::is_some)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn stale_claims_and_failed_tasks_can_be_requeued() {
    let dir = tempdir().unwrap();
    let scheduler = scheduler(&dir.path().join("tablescout.db"));
    scheduler
        .enqueue_url("https://crash.test", "Crash", TaskType::Text, None, None)
        .unwrap();

    let claimed = scheduler.claim_next(None).unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(scheduler.reset_stale(Duration::ZERO).unwrap(), 1);
    assert_eq!(
        scheduler.get(&claimed.task_id).unwrap().unwrap().status,
        TaskStatus::Pending
    );

    let mut task = scheduler.claim_next(None).unwrap().unwrap();
    scheduler
        .fail(&mut task, &AttemptError::InvalidTarget("no website".to_string()))
        .unwrap();
    assert_eq!(scheduler.retry_failed(Some(TaskType::Text)).unwrap(), 1);
    assert!(scheduler.claim_next(None).unwrap().is_some());
}
