//! Integration tests for the Redis-backed durable queue.
//!
//! Every test probes the store first and skips (early-returns) when Redis
//! is unreachable, so an absent store never reads as a queue bug. Each test
//! uses a unique key prefix for isolation.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

use chrono::Utc;
use redis::AsyncCommands;
use serde_json::json;
use uuid::Uuid;
use workbench_core::error::ErrorKind;
use workbench_entity::job::filter::JobFilter;
use workbench_entity::job::kind::JobType;
use workbench_entity::job::model::{Job, JobCreateParams};
use workbench_entity::job::status::JobStatus;
use workbench_queue::backend::JobQueue;
use workbench_queue::redis::RedisJobQueue;

use common::{
    CountingHandler, FlakyHandler, RecordingHandler, init_tracing, redis_available,
    redis_test_config,
};

/// Poll a job until the predicate holds or the timeout expires.
async fn poll_until<F>(queue: &RedisJobQueue, id: Uuid, timeout: Duration, predicate: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(job) = queue.get_job(id).await.unwrap() {
            if predicate(&job) {
                return job;
            }
        }
        assert!(Instant::now() < deadline, "timed out polling job {id}");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_jobs_survive_restart() {
    init_tracing();
    let config = redis_test_config();
    if !redis_available(&config).await {
        eprintln!("skipping test_jobs_survive_restart: Redis not available");
        return;
    }

    // First instance persists jobs but never processes them.
    let mut ids = Vec::new();
    {
        let first = RedisJobQueue::connect(config.clone()).await.unwrap();
        for i in 0..3 {
            let job = first
                .add_job(JobCreateParams::new(
                    JobType::FileProcessing,
                    json!({"file_path": format!("{i}.csv"), "dataset_id": "d1"}),
                ))
                .await
                .unwrap();
            ids.push(job.id);
        }
    }

    // A fresh connection sees everything and completes it.
    let second = RedisJobQueue::connect(config).await.unwrap();
    let stats = second.stats().await.unwrap();
    assert_eq!(stats.pending, 3);
    assert_eq!(second.get_jobs(&JobFilter::default()).await.unwrap().len(), 3);

    second.register_handler(RecordingHandler::new(JobType::FileProcessing));
    second.start().await.unwrap();

    for id in ids {
        let done = second.wait_for_job(id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_mid_retry_job_survives_restart() {
    init_tracing();
    let mut config = redis_test_config();
    // Park the retry far enough out that the restart happens mid-backoff.
    config.retry_backoff_base_ms = 1_500;
    config.retry_backoff_cap_ms = 1_500;
    if !redis_available(&config).await {
        eprintln!("skipping test_mid_retry_job_survives_restart: Redis not available");
        return;
    }

    let first = RedisJobQueue::connect(config.clone()).await.unwrap();
    first.register_handler(FlakyHandler::new(JobType::SecurityScan, 1));
    let job = first
        .add_job(JobCreateParams::new(
            JobType::SecurityScan,
            json!({"file_path": "a.csv", "dataset_id": "d1"}),
        ))
        .await
        .unwrap();
    first.start().await.unwrap();

    // One failed attempt, now waiting out its backoff.
    poll_until(&first, job.id, Duration::from_secs(5), |j| {
        j.attempts == 1 && j.status == JobStatus::Pending
    })
    .await;
    first.stop().await.unwrap();
    drop(first);

    let second = RedisJobQueue::connect(config).await.unwrap();
    second.register_handler(FlakyHandler::new(JobType::SecurityScan, 0));
    second.start().await.unwrap();

    let done = poll_until(&second, job.id, Duration::from_secs(10), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempts, 2);
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_two_workers_claim_exactly_once() {
    init_tracing();
    let config = redis_test_config();
    if !redis_available(&config).await {
        eprintln!("skipping test_two_workers_claim_exactly_once: Redis not available");
        return;
    }

    let invocations = Arc::new(AtomicUsize::new(0));
    let first = RedisJobQueue::connect(config.clone()).await.unwrap();
    let second = RedisJobQueue::connect(config).await.unwrap();
    first.register_handler(CountingHandler::new(
        JobType::FileProcessing,
        Arc::clone(&invocations),
        Duration::from_millis(50),
    ));
    second.register_handler(CountingHandler::new(
        JobType::FileProcessing,
        Arc::clone(&invocations),
        Duration::from_millis(50),
    ));

    let job = first
        .add_job(JobCreateParams::new(
            JobType::FileProcessing,
            json!({"file_path": "a.csv", "dataset_id": "d1"}),
        ))
        .await
        .unwrap();

    first.start().await.unwrap();
    second.start().await.unwrap();

    let done = poll_until(&first, job.id, Duration::from_secs(10), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(done.status, JobStatus::Completed);

    // Give a hypothetical duplicate execution time to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1);

    first.stop().await.unwrap();
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_retry_then_dead_letter_and_requeue() {
    init_tracing();
    let config = redis_test_config();
    if !redis_available(&config).await {
        eprintln!("skipping test_retry_then_dead_letter_and_requeue: Redis not available");
        return;
    }

    let queue = RedisJobQueue::connect(config).await.unwrap();
    queue.register_handler(FlakyHandler::new(JobType::SecurityScan, usize::MAX));
    let doomed = queue
        .add_job(
            JobCreateParams::new(
                JobType::SecurityScan,
                json!({"file_path": "a.csv", "dataset_id": "d1"}),
            )
            .with_max_attempts(2),
        )
        .await
        .unwrap();
    queue.start().await.unwrap();

    // Exactly max_attempts failures land the job in the dead-letter list.
    let dead = poll_until(&queue, doomed.id, Duration::from_secs(10), |j| {
        j.status == JobStatus::Failed
    })
    .await;
    assert_eq!(dead.attempts, 2);

    let parked = queue.dead_letter_jobs(10).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].id, doomed.id);
    assert_eq!(queue.stats().await.unwrap().dead_letter, 1);

    // A handler that fails fewer times than the budget still completes.
    let flaky = FlakyHandler::new(JobType::DataExport, 1);
    queue.register_handler(flaky.clone());
    let recovers = queue
        .add_job(
            JobCreateParams::new(JobType::DataExport, json!({"dataset_id": "d1", "format": "csv"}))
                .with_max_attempts(3),
        )
        .await
        .unwrap();
    let done = poll_until(&queue, recovers.id, Duration::from_secs(10), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result.unwrap()["succeeded_on_call"], 2);
    assert!(!queue
        .dead_letter_jobs(10)
        .await
        .unwrap()
        .iter()
        .any(|j| j.id == recovers.id));

    // Requeue the dead-letter job behind a now-working handler.
    queue.register_handler(RecordingHandler::new(JobType::SecurityScan));
    assert!(queue.requeue_dead_letter(doomed.id).await.unwrap());
    assert!(!queue.requeue_dead_letter(Uuid::new_v4()).await.unwrap());

    let revived = poll_until(&queue, doomed.id, Duration::from_secs(10), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(revived.status, JobStatus::Completed);
    assert_eq!(queue.stats().await.unwrap().dead_letter, 0);

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed() {
    init_tracing();
    let config = redis_test_config();
    if !redis_available(&config).await {
        eprintln!("skipping test_expired_lease_is_reclaimed: Redis not available");
        return;
    }

    let queue = RedisJobQueue::connect(config.clone()).await.unwrap();
    let job = queue
        .add_job(JobCreateParams::new(
            JobType::FileProcessing,
            json!({"file_path": "a.csv", "dataset_id": "d1"}),
        ))
        .await
        .unwrap();

    // Forge the store state of a worker that crashed mid-run: the job is
    // running, leased, and the lease expired a minute ago.
    let client = redis::Client::open(config.redis.url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let prefix = &config.redis.key_prefix;
    let job_key = format!("{prefix}job:{}", job.id);

    let raw: String = conn.get(&job_key).await.unwrap();
    let mut record: Job = serde_json::from_str(&raw).unwrap();
    record.status = JobStatus::Running;
    record.attempts = 1;
    record.started_at = Some(Utc::now());
    let _: () = conn
        .set(&job_key, serde_json::to_string(&record).unwrap())
        .await
        .unwrap();
    let _: i64 = conn
        .zrem(format!("{prefix}pending"), job.id.to_string())
        .await
        .unwrap();
    let _: () = conn
        .zadd(
            format!("{prefix}processing"),
            job.id.to_string(),
            (Utc::now().timestamp_millis() - 60_000) as f64,
        )
        .await
        .unwrap();

    queue.register_handler(RecordingHandler::new(JobType::FileProcessing));
    queue.start().await.unwrap();

    let done = poll_until(&queue, job.id, Duration::from_secs(10), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(done.status, JobStatus::Completed);
    // One attempt charged to the crashed worker, one to the reclaim.
    assert_eq!(done.attempts, 2);

    queue.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancel_pending_before_any_worker_runs() {
    init_tracing();
    let config = redis_test_config();
    if !redis_available(&config).await {
        eprintln!("skipping test_cancel_pending_before_any_worker_runs: Redis not available");
        return;
    }

    let queue = RedisJobQueue::connect(config).await.unwrap();
    let job = queue
        .add_job(JobCreateParams::new(
            JobType::DataExport,
            json!({"dataset_id": "d1", "format": "csv"}),
        ))
        .await
        .unwrap();

    assert!(queue.cancel_job(job.id).await.unwrap());
    let cancelled = queue.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(!queue.cancel_job(job.id).await.unwrap());

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.cancelled, 1);
}

#[tokio::test]
async fn test_unreachable_store_surfaces_as_redis_error() {
    init_tracing();
    let mut config = redis_test_config();
    config.redis.url = "redis://127.0.0.1:1/".to_string();

    match tokio::time::timeout(Duration::from_secs(5), RedisJobQueue::connect(config)).await {
        Ok(result) => {
            let err = result.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Redis);
        }
        Err(_) => {
            eprintln!(
                "skipping test_unreachable_store_surfaces_as_redis_error: connect did not fail fast"
            );
        }
    }
}
