//! Redis-backed durable job queue.
//!
//! Same public contract as the memory backend, but jobs and their state
//! survive process restarts. Claims go through `ZPOPMIN` on the pending
//! sorted set, so at most one worker — in this process or any other —
//! obtains a given job. Claimed jobs carry a lease; a housekeeping loop
//! reclaims jobs whose lease expired and re-enqueues or dead-letters them.
//! Failed jobs with attempts remaining wait in a delayed sorted set and are
//! promoted back to pending once their backoff elapses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::{Semaphore, broadcast, watch};
use tokio::time;
use tracing;
use uuid::Uuid;

use workbench_core::AppResult;
use workbench_core::config::queue::QueueConfig;
use workbench_core::error::{AppError, ErrorKind};
use workbench_entity::job::filter::JobFilter;
use workbench_entity::job::model::{Job, JobCreateParams};
use workbench_entity::job::status::JobStatus;

use crate::backend::{JobQueue, QueueBackendKind, QueueStats};
use crate::events::{JobEvent, JobEventBus};
use crate::handler::{JobContext, JobExecutionError, JobHandler, ProgressSink};
use crate::registry::HandlerRegistry;

use super::client::RedisClient;
use super::keys::{QueueKeys, pending_score};

/// Bound on the graceful-drain wait during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Most ids a single housekeeping sweep promotes or reclaims.
const HOUSEKEEPING_BATCH: isize = 64;

/// Most index entries a listing scans before giving up on its cap.
const INDEX_SCAN_CAP: isize = 1_000;

/// Everything the scheduler loop and execution tasks share.
#[derive(Debug, Clone)]
struct SharedState {
    client: RedisClient,
    keys: Arc<QueueKeys>,
    registry: Arc<HandlerRegistry>,
    events: JobEventBus,
    cancel_flags: Arc<DashMap<Uuid, Arc<AtomicBool>>>,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
}

/// Redis-backed durable job queue backend.
#[derive(Debug)]
pub struct RedisJobQueue {
    state: SharedState,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl RedisJobQueue {
    /// Connect to Redis and build a queue. The scheduler does not run until
    /// [`start`](JobQueue::start) is called.
    pub async fn connect(config: QueueConfig) -> AppResult<Self> {
        let client = RedisClient::connect(&config.redis).await?;
        let keys = Arc::new(QueueKeys::new(config.redis.key_prefix.clone()));
        let concurrency = config.concurrency.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            state: SharedState {
                client,
                keys,
                registry: Arc::new(HandlerRegistry::new()),
                events: JobEventBus::new(),
                cancel_flags: Arc::new(DashMap::new()),
                semaphore: Arc::new(Semaphore::new(concurrency)),
                config,
            },
            shutdown_tx,
            started: AtomicBool::new(false),
        })
    }
}

/// Map a Redis error to an AppError.
fn map_redis_err(e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::Redis, format!("Redis error: {e}"), e)
}

/// Load a job record by id.
async fn load_job(state: &SharedState, id: Uuid) -> AppResult<Option<Job>> {
    let mut conn = state.client.conn_mut();
    let raw: Option<String> = conn
        .get(state.keys.job(id))
        .await
        .map_err(map_redis_err)?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Persist a job record.
async fn store_job(state: &SharedState, job: &Job) -> AppResult<()> {
    let raw = serde_json::to_string(job)?;
    let mut conn = state.client.conn_mut();
    let _: () = conn
        .set(state.keys.job(job.id), raw)
        .await
        .map_err(map_redis_err)?;
    Ok(())
}

/// Get or create the advisory cancellation flag for a job.
fn cancel_flag(state: &SharedState, id: Uuid) -> Arc<AtomicBool> {
    Arc::clone(
        state
            .cancel_flags
            .entry(id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .value(),
    )
}

/// Claim jobs while a worker slot and a pending job are both available,
/// spawning one execution task per claim.
async fn claim_and_spawn(state: &SharedState) {
    loop {
        let permit = match Arc::clone(&state.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let job = match claim_next(state).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                drop(permit);
                return;
            }
            Err(e) => {
                drop(permit);
                tracing::error!("Failed to claim job: {e}");
                return;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute_job(state, job).await;
        });
    }
}

/// Atomically pop the best pending job and lease it to this worker.
async fn claim_next(state: &SharedState) -> AppResult<Option<Job>> {
    let mut conn = state.client.conn_mut();
    let popped: Vec<(String, f64)> = conn
        .zpopmin(state.keys.pending(), 1)
        .await
        .map_err(map_redis_err)?;
    let Some((raw_id, _score)) = popped.into_iter().next() else {
        return Ok(None);
    };
    let Ok(id) = Uuid::parse_str(&raw_id) else {
        tracing::warn!("Discarding malformed job id '{raw_id}' from pending set");
        return Ok(None);
    };
    let Some(mut job) = load_job(state, id).await? else {
        tracing::warn!("Job {id} was in the pending set but has no record");
        return Ok(None);
    };

    let now = Utc::now();
    job.status = JobStatus::Running;
    job.started_at = Some(now);
    job.updated_at = now;
    job.attempts += 1;
    job.progress = 0;
    store_job(state, &job).await?;

    let lease_expiry = now.timestamp_millis() + state.config.lease_seconds as i64 * 1_000;
    let _: () = conn
        .zadd(state.keys.processing(), raw_id, lease_expiry as f64)
        .await
        .map_err(map_redis_err)?;
    Ok(Some(job))
}

/// Run one claimed job to settlement.
async fn execute_job(state: SharedState, job: Job) {
    tracing::info!(
        "Processing job: id={}, type='{}', attempt={}/{}",
        job.id,
        job.job_type,
        job.attempts,
        job.max_attempts
    );
    state.events.publish(JobEvent::Started(job.clone()));

    let cancelled = cancel_flag(&state, job.id);
    let sink: Arc<dyn ProgressSink> = Arc::new(RedisProgressSink {
        state: state.clone(),
    });
    let ctx = JobContext::new(job.id, Arc::clone(&cancelled), sink);

    let outcome = if cancelled.load(Ordering::Relaxed) {
        // Cancelled between the claim and the first instruction of work.
        Err(JobExecutionError::Cancelled)
    } else {
        match state.registry.get(job.job_type) {
            Some(handler) => handler.execute(&job, &ctx).await,
            None => Err(JobExecutionError::Permanent(format!(
                "no handler registered for job type '{}'",
                job.job_type
            ))),
        }
    };

    state.cancel_flags.remove(&job.id);
    if let Err(e) = settle_job(&state, job, outcome).await {
        tracing::error!("Failed to record job settlement: {e}");
    }
}

/// Record the outcome of an execution: completion, cancellation, a delayed
/// retry, or dead-lettering.
async fn settle_job(
    state: &SharedState,
    job: Job,
    outcome: Result<Option<Value>, JobExecutionError>,
) -> AppResult<()> {
    let mut conn = state.client.conn_mut();

    // If the lease was reclaimed mid-run, another worker owns the job now
    // and this worker's outcome must not be recorded.
    let owned: i64 = conn
        .zrem(state.keys.processing(), job.id.to_string())
        .await
        .map_err(map_redis_err)?;
    if owned == 0 {
        tracing::warn!(
            "Job {} lease expired before settlement; discarding this worker's outcome",
            job.id
        );
        return Ok(());
    }

    // Re-load for the freshest progress snapshot.
    let mut job = load_job(state, job.id).await?.unwrap_or(job);
    let now = Utc::now();
    job.updated_at = now;

    match outcome {
        Ok(result) => {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.result = result;
            job.completed_at = Some(now);
            store_job(state, &job).await?;
            let _: () = conn
                .sadd(state.keys.status_set(JobStatus::Completed), job.id.to_string())
                .await
                .map_err(map_redis_err)?;
            tracing::info!("Job {} completed successfully", job.id);
            state.events.publish(JobEvent::Completed(job));
        }
        Err(JobExecutionError::Cancelled) => {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            store_job(state, &job).await?;
            let _: () = conn
                .sadd(state.keys.status_set(JobStatus::Cancelled), job.id.to_string())
                .await
                .map_err(map_redis_err)?;
            tracing::info!("Job {} cancelled", job.id);
            state.events.publish(JobEvent::Cancelled(job));
        }
        Err(JobExecutionError::Transient(msg)) if job.has_attempts_remaining() => {
            job.status = JobStatus::Pending;
            job.error_message = Some(msg.clone());
            store_job(state, &job).await?;
            let delay_ms = state.config.backoff_ms(job.attempts);
            let ready_at = now.timestamp_millis() + delay_ms as i64;
            let _: () = conn
                .zadd(state.keys.delayed(), job.id.to_string(), ready_at as f64)
                .await
                .map_err(map_redis_err)?;
            tracing::warn!(
                "Job {} failed (transient): {}; retry {}/{} in {}ms",
                job.id,
                msg,
                job.attempts,
                job.max_attempts,
                delay_ms
            );
        }
        Err(err) => {
            dead_letter(state, &mut conn, job, &err.to_string(), now).await?;
        }
    }
    Ok(())
}

/// Park a job in the dead-letter set with status `Failed`.
async fn dead_letter(
    state: &SharedState,
    conn: &mut redis::aio::ConnectionManager,
    mut job: Job,
    error: &str,
    now: chrono::DateTime<Utc>,
) -> AppResult<()> {
    job.status = JobStatus::Failed;
    job.error_message = Some(error.to_string());
    job.completed_at = Some(now);
    job.updated_at = now;
    store_job(state, &job).await?;
    let _: () = redis::pipe()
        .atomic()
        .zadd(
            state.keys.dead_letter(),
            job.id.to_string(),
            now.timestamp_millis() as f64,
        )
        .ignore()
        .sadd(state.keys.status_set(JobStatus::Failed), job.id.to_string())
        .ignore()
        .query_async(conn)
        .await
        .map_err(map_redis_err)?;
    tracing::error!(
        "Job {} failed permanently after {} attempt(s): {}",
        job.id,
        job.attempts,
        error
    );
    state.events.publish(JobEvent::Failed(job.clone()));
    state.events.publish(JobEvent::DeadLettered(job));
    Ok(())
}

/// Progress receiver persisting to the Redis job record.
#[derive(Debug)]
struct RedisProgressSink {
    state: SharedState,
}

#[async_trait]
impl ProgressSink for RedisProgressSink {
    async fn update(&self, job_id: Uuid, percent: u8) -> AppResult<()> {
        let Some(mut job) = load_job(&self.state, job_id).await? else {
            return Err(AppError::not_found(format!("Job {job_id} not found")));
        };
        if job.status != JobStatus::Running {
            // The job settled (or was reclaimed) while the handler was
            // still reporting.
            return Ok(());
        }
        job.progress = percent;
        job.updated_at = Utc::now();
        store_job(&self.state, &job).await?;
        self.state.events.publish(JobEvent::Progress(job));
        Ok(())
    }
}

/// Move due delayed-retry jobs back to the pending set.
async fn promote_delayed(state: &SharedState) -> AppResult<()> {
    let now_ms = Utc::now().timestamp_millis();
    let mut conn = state.client.conn_mut();
    let due: Vec<String> = conn
        .zrangebyscore_limit(
            state.keys.delayed(),
            0f64,
            now_ms as f64,
            0,
            HOUSEKEEPING_BATCH,
        )
        .await
        .map_err(map_redis_err)?;

    for raw_id in due {
        let moved: i64 = conn
            .zrem(state.keys.delayed(), &raw_id)
            .await
            .map_err(map_redis_err)?;
        if moved == 0 {
            continue;
        }
        let Ok(id) = Uuid::parse_str(&raw_id) else {
            continue;
        };
        let Some(job) = load_job(state, id).await? else {
            continue;
        };
        let _: () = conn
            .zadd(
                state.keys.pending(),
                raw_id,
                pending_score(job.priority, job.created_at),
            )
            .await
            .map_err(map_redis_err)?;
        tracing::debug!("Promoted delayed job {id} back to pending");
    }
    Ok(())
}

/// Re-enqueue or dead-letter jobs whose lease has expired.
async fn reclaim_expired(state: &SharedState) -> AppResult<()> {
    let now = Utc::now();
    let mut conn = state.client.conn_mut();
    let expired: Vec<String> = conn
        .zrangebyscore_limit(
            state.keys.processing(),
            0f64,
            now.timestamp_millis() as f64,
            0,
            HOUSEKEEPING_BATCH,
        )
        .await
        .map_err(map_redis_err)?;

    for raw_id in expired {
        // Winning this removal is what makes the reclaim exclusive: the
        // previous owner's settlement checks the same set and backs off.
        let won: i64 = conn
            .zrem(state.keys.processing(), &raw_id)
            .await
            .map_err(map_redis_err)?;
        if won == 0 {
            continue;
        }
        let Ok(id) = Uuid::parse_str(&raw_id) else {
            continue;
        };
        let Some(mut job) = load_job(state, id).await? else {
            continue;
        };
        if job.status != JobStatus::Running {
            continue;
        }
        job.updated_at = now;
        if job.has_attempts_remaining() {
            job.status = JobStatus::Pending;
            job.error_message = Some("worker lease expired; job reclaimed".to_string());
            store_job(state, &job).await?;
            let _: () = conn
                .zadd(
                    state.keys.pending(),
                    raw_id,
                    pending_score(job.priority, job.created_at),
                )
                .await
                .map_err(map_redis_err)?;
            tracing::warn!(
                "Reclaimed job {} after lease expiry (attempt {}/{})",
                id,
                job.attempts,
                job.max_attempts
            );
        } else {
            dead_letter(
                state,
                &mut conn,
                job,
                "worker lease expired with no attempts remaining",
                now,
            )
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn add_job(&self, params: JobCreateParams) -> AppResult<Job> {
        params.validate()?;
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            job_type: params.job_type,
            priority: params.priority,
            payload: params.payload,
            result: None,
            error_message: None,
            status: JobStatus::Pending,
            progress: 0,
            attempts: 0,
            max_attempts: params
                .max_attempts
                .unwrap_or(self.state.config.default_max_attempts),
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };

        let raw = serde_json::to_string(&job)?;
        let mut conn = self.state.client.conn_mut();
        let _: () = redis::pipe()
            .atomic()
            .set(self.state.keys.job(job.id), raw)
            .ignore()
            .zadd(
                self.state.keys.pending(),
                job.id.to_string(),
                pending_score(job.priority, job.created_at),
            )
            .ignore()
            .lpush(self.state.keys.index(), job.id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        tracing::debug!(
            "Enqueued job: id={}, type='{}', priority={}",
            job.id,
            job.job_type,
            job.priority
        );
        self.state.events.publish(JobEvent::Added(job.clone()));
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        load_job(&self.state, id).await
    }

    async fn get_jobs(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let mut conn = self.state.client.conn_mut();
        let ids: Vec<String> = conn
            .lrange(self.state.keys.index(), 0, INDEX_SCAN_CAP - 1)
            .await
            .map_err(map_redis_err)?;

        let limit = filter.effective_limit();
        let mut jobs = Vec::new();
        for raw_id in ids {
            if jobs.len() >= limit {
                break;
            }
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                continue;
            };
            let Some(job) = load_job(&self.state, id).await? else {
                continue;
            };
            if filter.matches(&job) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn cancel_job(&self, id: Uuid) -> AppResult<bool> {
        let Some(mut job) = load_job(&self.state, id).await? else {
            return Ok(false);
        };
        match job.status {
            JobStatus::Pending => {
                let mut conn = self.state.client.conn_mut();
                let mut removed: i64 = conn
                    .zrem(self.state.keys.pending(), id.to_string())
                    .await
                    .map_err(map_redis_err)?;
                if removed == 0 {
                    removed = conn
                        .zrem(self.state.keys.delayed(), id.to_string())
                        .await
                        .map_err(map_redis_err)?;
                }
                if removed == 0 {
                    // Lost the race with a claimer; fall back to the
                    // advisory flag.
                    cancel_flag(&self.state, id).store(true, Ordering::Relaxed);
                    return Ok(true);
                }
                let now = Utc::now();
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                job.updated_at = now;
                store_job(&self.state, &job).await?;
                let _: () = conn
                    .sadd(
                        self.state.keys.status_set(JobStatus::Cancelled),
                        id.to_string(),
                    )
                    .await
                    .map_err(map_redis_err)?;
                tracing::debug!("Job {id} cancelled while pending");
                self.state.events.publish(JobEvent::Cancelled(job));
                Ok(true)
            }
            JobStatus::Running => {
                // Advisory only: the running handler decides when to stop.
                cancel_flag(&self.state, id).store(true, Ordering::Relaxed);
                tracing::debug!("Cancellation requested for running job {id}");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let mut conn = self.state.client.conn_mut();
        let pending: i64 = conn
            .zcard(self.state.keys.pending())
            .await
            .map_err(map_redis_err)?;
        let delayed: i64 = conn
            .zcard(self.state.keys.delayed())
            .await
            .map_err(map_redis_err)?;
        let running: i64 = conn
            .zcard(self.state.keys.processing())
            .await
            .map_err(map_redis_err)?;
        let completed: i64 = conn
            .scard(self.state.keys.status_set(JobStatus::Completed))
            .await
            .map_err(map_redis_err)?;
        let failed: i64 = conn
            .scard(self.state.keys.status_set(JobStatus::Failed))
            .await
            .map_err(map_redis_err)?;
        let cancelled: i64 = conn
            .scard(self.state.keys.status_set(JobStatus::Cancelled))
            .await
            .map_err(map_redis_err)?;
        let dead_letter: i64 = conn
            .zcard(self.state.keys.dead_letter())
            .await
            .map_err(map_redis_err)?;

        Ok(QueueStats {
            backend: QueueBackendKind::Redis,
            pending: pending + delayed,
            running,
            completed,
            failed,
            cancelled,
            dead_letter,
        })
    }

    fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        self.state.registry.register(handler);
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.state.events.subscribe()
    }

    async fn start(&self) -> AppResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(
            concurrency = self.state.config.concurrency,
            poll_interval_ms = self.state.config.poll_interval_ms,
            lease_seconds = self.state.config.lease_seconds,
            "Redis job queue started"
        );

        let poll_interval = Duration::from_millis(self.state.config.poll_interval_ms.max(1));

        let state = self.state.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                claim_and_spawn(&state).await;
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = time::sleep(poll_interval) => {}
                }
            }
            tracing::debug!("Redis queue scheduler loop exited");
        });

        let state = self.state.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = promote_delayed(&state).await {
                    tracing::error!("Failed to promote delayed jobs: {e}");
                }
                if let Err(e) = reclaim_expired(&state).await {
                    tracing::error!("Failed to reclaim expired leases: {e}");
                }
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = time::sleep(poll_interval) => {}
                }
            }
            tracing::debug!("Redis queue housekeeping loop exited");
        });

        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        self.shutdown_tx.send_replace(true);

        let max_permits = self.state.config.concurrency.max(1) as u32;
        tracing::info!("Redis queue waiting for in-flight jobs to complete...");
        match time::timeout(DRAIN_TIMEOUT, self.state.semaphore.acquire_many(max_permits)).await {
            Ok(Ok(_permits)) => {}
            Ok(Err(_)) | Err(_) => {
                tracing::warn!("Timed out waiting for in-flight jobs to finish");
            }
        }
        tracing::info!("Redis job queue stopped");
        Ok(())
    }

    fn backend_kind(&self) -> QueueBackendKind {
        QueueBackendKind::Redis
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.state.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(pong == "PONG")
    }

    async fn cleanup_jobs(&self, older_than: Duration) -> AppResult<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| AppError::validation(format!("Invalid cleanup cutoff: {e}")))?;

        let mut conn = self.state.client.conn_mut();
        let ids: Vec<String> = conn
            .lrange(self.state.keys.index(), 0, -1)
            .await
            .map_err(map_redis_err)?;

        let mut removed = 0u64;
        for raw_id in ids {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                let _: i64 = conn
                    .lrem(self.state.keys.index(), 0, &raw_id)
                    .await
                    .map_err(map_redis_err)?;
                continue;
            };
            match load_job(&self.state, id).await? {
                None => {
                    let _: i64 = conn
                        .lrem(self.state.keys.index(), 0, &raw_id)
                        .await
                        .map_err(map_redis_err)?;
                }
                Some(job)
                    if job.status.is_terminal()
                        && job.completed_at.is_some_and(|at| at < cutoff) =>
                {
                    let _: () = redis::pipe()
                        .atomic()
                        .del(self.state.keys.job(id))
                        .ignore()
                        .lrem(self.state.keys.index(), 0, &raw_id)
                        .ignore()
                        .srem(self.state.keys.status_set(JobStatus::Completed), &raw_id)
                        .ignore()
                        .srem(self.state.keys.status_set(JobStatus::Failed), &raw_id)
                        .ignore()
                        .srem(self.state.keys.status_set(JobStatus::Cancelled), &raw_id)
                        .ignore()
                        .zrem(self.state.keys.dead_letter(), &raw_id)
                        .ignore()
                        .query_async(&mut conn)
                        .await
                        .map_err(map_redis_err)?;
                    removed += 1;
                }
                Some(_) => {}
            }
        }
        if removed > 0 {
            tracing::info!("Cleaned up {removed} terminal jobs");
        }
        Ok(removed)
    }

    async fn dead_letter_jobs(&self, limit: usize) -> AppResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.state.client.conn_mut();
        let ids: Vec<String> = conn
            .zrevrange(self.state.keys.dead_letter(), 0, limit as isize - 1)
            .await
            .map_err(map_redis_err)?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                continue;
            };
            if let Some(job) = load_job(&self.state, id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn requeue_dead_letter(&self, id: Uuid) -> AppResult<bool> {
        let mut conn = self.state.client.conn_mut();
        let removed: i64 = conn
            .zrem(self.state.keys.dead_letter(), id.to_string())
            .await
            .map_err(map_redis_err)?;
        if removed == 0 {
            return Ok(false);
        }
        let Some(mut job) = load_job(&self.state, id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.error_message = None;
        job.result = None;
        job.progress = 0;
        job.started_at = None;
        job.completed_at = None;
        job.updated_at = now;
        store_job(&self.state, &job).await?;

        let _: () = redis::pipe()
            .atomic()
            .srem(self.state.keys.status_set(JobStatus::Failed), id.to_string())
            .ignore()
            .zadd(
                self.state.keys.pending(),
                id.to_string(),
                pending_score(job.priority, job.created_at),
            )
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        tracing::info!("Requeued dead-letter job {id}");
        self.state.events.publish(JobEvent::Requeued(job));
        Ok(true)
    }
}
