//! Integration tests for the queue factory: caching, reset, and backend
//! switching.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use workbench_core::error::ErrorKind;
use workbench_entity::job::kind::JobType;
use workbench_entity::job::model::JobCreateParams;
use workbench_entity::job::status::JobStatus;
use workbench_queue::QueueFactory;
use workbench_queue::backend::{JobQueue, QueueBackendKind};

use common::{RecordingHandler, fast_config, init_tracing, redis_available, redis_test_config};

#[tokio::test]
async fn test_get_returns_cached_instance() {
    init_tracing();
    let factory = QueueFactory::new(fast_config());
    let first = factory.get().await.unwrap();
    let second = factory.get().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_create_is_independent_of_singleton() {
    init_tracing();
    let factory = QueueFactory::new(fast_config());
    let shared = factory.get().await.unwrap();
    let isolated = factory.create().await.unwrap();
    assert!(!Arc::ptr_eq(&shared, &isolated));
}

#[tokio::test]
async fn test_unknown_backend_is_a_configuration_error() {
    init_tracing();
    let mut config = fast_config();
    config.backend = "postgres".to_string();
    let factory = QueueFactory::new(config);
    let err = factory.get().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}

#[tokio::test]
async fn test_reset_discards_memory_state_and_handlers() {
    init_tracing();
    let factory = QueueFactory::new(fast_config());

    let queue = factory.get().await.unwrap();
    queue.register_handler(RecordingHandler::new(JobType::DataExport));
    let job = queue
        .add_job(JobCreateParams::new(JobType::DataExport, json!({"n": 1})))
        .await
        .unwrap();
    queue
        .wait_for_job(job.id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(queue.stats().await.unwrap().completed, 1);

    factory.reset().await.unwrap();
    let fresh = factory.get().await.unwrap();
    assert!(!Arc::ptr_eq(&queue, &fresh));

    // All state is gone: no pending, running, or historical jobs.
    let stats = fresh.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 0);

    // Handlers did not carry over: the same job type now fails.
    let orphan = fresh
        .add_job(JobCreateParams::new(JobType::DataExport, json!({"n": 2})))
        .await
        .unwrap();
    let failed = fresh
        .wait_for_job(orphan.id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(
        failed
            .error_message
            .as_deref()
            .unwrap()
            .contains("no handler registered")
    );

    // Re-registering restores normal processing.
    fresh.register_handler(RecordingHandler::new(JobType::DataExport));
    let job = fresh
        .add_job(JobCreateParams::new(JobType::DataExport, json!({"n": 3})))
        .await
        .unwrap();
    let done = fresh
        .wait_for_job(job.id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_config_change_plus_reset_switches_backend() {
    init_tracing();
    let redis_config = redis_test_config();
    if !redis_available(&redis_config).await {
        eprintln!("skipping test_config_change_plus_reset_switches_backend: Redis not available");
        return;
    }

    let memory_config = fast_config();
    let use_redis = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&use_redis);
    let factory = QueueFactory::with_loader(move || {
        if flag.load(Ordering::SeqCst) {
            redis_config.clone()
        } else {
            memory_config.clone()
        }
    });

    let first = factory.get().await.unwrap();
    assert_eq!(first.backend_kind(), QueueBackendKind::Memory);

    factory.reset().await.unwrap();
    use_redis.store(true, Ordering::SeqCst);

    let second = factory.get().await.unwrap();
    assert_eq!(second.backend_kind(), QueueBackendKind::Redis);
    assert!(second.health_check().await.unwrap());
}
