//! Shared test helpers: tuned configs and reusable job handlers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use workbench_core::config::queue::QueueConfig;
use workbench_entity::job::kind::JobType;
use workbench_entity::job::model::Job;
use workbench_queue::handler::{JobContext, JobExecutionError, JobHandler};
use workbench_queue::redis::RedisClient;

/// Initialize env-filtered tracing once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Queue config tuned for fast tests.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 20,
        retry_backoff_base_ms: 40,
        retry_backoff_cap_ms: 200,
        ..QueueConfig::default()
    }
}

/// Fast config pointed at the redis backend, with a unique key prefix so
/// concurrent test runs cannot see each other's jobs.
pub fn redis_test_config() -> QueueConfig {
    let mut config = fast_config();
    config.backend = "redis".to_string();
    config.redis.key_prefix = format!("workbench:test:{}:", Uuid::new_v4());
    config
}

/// Probe the configured Redis store. Tests that need it early-return when
/// it is unreachable instead of failing.
pub async fn redis_available(config: &QueueConfig) -> bool {
    matches!(
        tokio::time::timeout(Duration::from_secs(2), RedisClient::connect(&config.redis)).await,
        Ok(Ok(_))
    )
}

/// Handler that records the order jobs were executed in.
#[derive(Debug)]
pub struct RecordingHandler {
    job_type: JobType,
    executed: Mutex<Vec<Uuid>>,
}

impl RecordingHandler {
    pub fn new(job_type: JobType) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<Uuid> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        self.executed.lock().unwrap().push(job.id);
        Ok(Some(json!({ "ok": true })))
    }
}

/// Handler that counts invocations through a shared counter, with an
/// optional artificial work duration.
#[derive(Debug)]
pub struct CountingHandler {
    job_type: JobType,
    count: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingHandler {
    pub fn new(job_type: JobType, count: Arc<AtomicUsize>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            count,
            delay,
        })
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        _job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Some(json!({ "counted": true })))
    }
}

/// Handler for the file-processing scenario: resolves with a row count.
#[derive(Debug)]
pub struct RowCountHandler;

#[async_trait]
impl JobHandler for RowCountHandler {
    fn job_type(&self) -> JobType {
        JobType::FileProcessing
    }

    async fn execute(
        &self,
        _job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        Ok(Some(json!({ "rows": 10 })))
    }
}

/// Handler that sleeps for a fixed duration before succeeding.
#[derive(Debug)]
pub struct SlowHandler {
    job_type: JobType,
    delay: Duration,
}

impl SlowHandler {
    pub fn new(job_type: JobType, delay: Duration) -> Arc<Self> {
        Arc::new(Self { job_type, delay })
    }
}

#[async_trait]
impl JobHandler for SlowHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        _job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(json!({ "slept_ms": self.delay.as_millis() as u64 })))
    }
}

/// Handler that reports progress at 25, 75, and 100 percent.
#[derive(Debug)]
pub struct ProgressHandler {
    job_type: JobType,
}

impl ProgressHandler {
    pub fn new(job_type: JobType) -> Arc<Self> {
        Arc::new(Self { job_type })
    }
}

#[async_trait]
impl JobHandler for ProgressHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        _job: &Job,
        ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        for percent in [25u8, 75, 100] {
            ctx.update_progress(percent)
                .await
                .map_err(JobExecutionError::Internal)?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(Some(json!({ "done": true })))
    }
}

/// Handler that fails with a transient error a fixed number of times, then
/// succeeds. `failures = usize::MAX` makes it fail forever.
#[derive(Debug)]
pub struct FlakyHandler {
    job_type: JobType,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn new(job_type: JobType, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        _job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(JobExecutionError::Transient(format!(
                "induced failure on call {call}"
            )))
        } else {
            Ok(Some(json!({ "succeeded_on_call": call })))
        }
    }
}

/// Handler that busy-waits on the cancellation flag and stops cleanly when
/// it is set.
#[derive(Debug)]
pub struct CancelAwareHandler {
    job_type: JobType,
}

impl CancelAwareHandler {
    pub fn new(job_type: JobType) -> Arc<Self> {
        Arc::new(Self { job_type })
    }
}

#[async_trait]
impl JobHandler for CancelAwareHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(
        &self,
        _job: &Job,
        ctx: &JobContext,
    ) -> Result<Option<Value>, JobExecutionError> {
        for _ in 0..500 {
            ctx.checkpoint()?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(Some(json!({ "ran_to_completion": true })))
    }
}
