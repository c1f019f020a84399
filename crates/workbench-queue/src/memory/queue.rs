//! In-memory job queue — lowest-latency scheduler for single-process
//! deployments. No durability: a process restart (or dropping the
//! instance) discards every job, pending and historical alike.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Semaphore, broadcast, watch};
use tokio::time;
use tracing;
use uuid::Uuid;

use workbench_core::AppResult;
use workbench_core::config::queue::QueueConfig;
use workbench_core::error::AppError;
use workbench_entity::job::filter::JobFilter;
use workbench_entity::job::model::{Job, JobCreateParams};
use workbench_entity::job::status::JobStatus;

use crate::backend::{JobQueue, QueueBackendKind, QueueStats};
use crate::events::{JobEvent, JobEventBus};
use crate::handler::{JobContext, JobExecutionError, JobHandler, ProgressSink};
use crate::registry::HandlerRegistry;

/// Bound on the graceful-drain wait during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the scheduler loop and execution tasks share.
#[derive(Debug, Clone)]
struct SharedState {
    jobs: Arc<DashMap<Uuid, Job>>,
    cancel_flags: Arc<DashMap<Uuid, Arc<AtomicBool>>>,
    registry: Arc<HandlerRegistry>,
    events: JobEventBus,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
}

/// In-memory job queue backend.
#[derive(Debug)]
pub struct MemoryJobQueue {
    state: SharedState,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl MemoryJobQueue {
    /// Create a new memory queue. The scheduler does not run until
    /// [`start`](JobQueue::start) is called.
    pub fn new(config: QueueConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: SharedState {
                jobs: Arc::new(DashMap::new()),
                cancel_flags: Arc::new(DashMap::new()),
                registry: Arc::new(HandlerRegistry::new()),
                events: JobEventBus::new(),
                semaphore: Arc::new(Semaphore::new(concurrency)),
                config,
            },
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }
}

/// Claim jobs while a worker slot and a pending job are both available,
/// spawning one execution task per claim.
fn claim_and_spawn(state: &SharedState) {
    loop {
        let permit = match Arc::clone(&state.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let Some(job) = claim_next(state) else {
            drop(permit);
            return;
        };
        let state = state.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute_job(state, job).await;
        });
    }
}

/// Select and claim the highest-priority pending job, FIFO within a
/// priority band. The claim mutates the entry under the map's entry lock,
/// so a concurrent cancel cannot race it.
fn claim_next(state: &SharedState) -> Option<Job> {
    let mut best: Option<(Uuid, u8, DateTime<Utc>)> = None;
    for entry in state.jobs.iter() {
        let job = entry.value();
        if job.status != JobStatus::Pending {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, priority, created_at)) => {
                job.priority.numeric_priority() > *priority
                    || (job.priority.numeric_priority() == *priority && job.created_at < *created_at)
            }
        };
        if better {
            best = Some((job.id, job.priority.numeric_priority(), job.created_at));
        }
    }

    let (id, _, _) = best?;
    let mut entry = state.jobs.get_mut(&id)?;
    if entry.status != JobStatus::Pending {
        return None;
    }
    let now = Utc::now();
    entry.status = JobStatus::Running;
    entry.started_at = Some(now);
    entry.updated_at = now;
    entry.attempts += 1;
    entry.progress = 0;
    Some(entry.clone())
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

/// Run one claimed job to settlement and record its terminal state.
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
    let sink: Arc<dyn ProgressSink> = Arc::new(MemoryProgressSink {
        jobs: Arc::clone(&state.jobs),
        events: state.events.clone(),
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

    let now = Utc::now();
    let event = {
        let Some(mut entry) = state.jobs.get_mut(&job.id) else {
            return;
        };
        entry.updated_at = now;
        entry.completed_at = Some(now);
        match outcome {
            Ok(result) => {
                entry.status = JobStatus::Completed;
                entry.progress = 100;
                entry.result = result;
                JobEvent::Completed(entry.clone())
            }
            Err(JobExecutionError::Cancelled) => {
                entry.status = JobStatus::Cancelled;
                JobEvent::Cancelled(entry.clone())
            }
            Err(err) => {
                entry.status = JobStatus::Failed;
                entry.error_message = Some(err.to_string());
                JobEvent::Failed(entry.clone())
            }
        }
    };
    state.cancel_flags.remove(&job.id);

    match &event {
        JobEvent::Completed(_) => tracing::info!("Job {} completed successfully", job.id),
        JobEvent::Cancelled(_) => tracing::info!("Job {} cancelled", job.id),
        JobEvent::Failed(snapshot) => tracing::warn!(
            "Job {} failed: {}",
            job.id,
            snapshot.error_message.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }
    state.events.publish(event);
}

/// Progress receiver writing straight into the in-memory store.
#[derive(Debug)]
struct MemoryProgressSink {
    jobs: Arc<DashMap<Uuid, Job>>,
    events: JobEventBus,
}

#[async_trait]
impl ProgressSink for MemoryProgressSink {
    async fn update(&self, job_id: Uuid, percent: u8) -> AppResult<()> {
        let snapshot = {
            let Some(mut entry) = self.jobs.get_mut(&job_id) else {
                return Err(AppError::not_found(format!("Job {job_id} not found")));
            };
            if entry.status != JobStatus::Running {
                // The job settled while the handler was still reporting.
                return Ok(());
            }
            entry.progress = percent;
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.events.publish(JobEvent::Progress(snapshot));
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
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
        self.state.jobs.insert(job.id, job.clone());
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
        Ok(self.state.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_jobs(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(filter.effective_limit());
        Ok(jobs)
    }

    async fn cancel_job(&self, id: Uuid) -> AppResult<bool> {
        let event = {
            let Some(mut entry) = self.state.jobs.get_mut(&id) else {
                return Ok(false);
            };
            match entry.status {
                JobStatus::Pending => {
                    let now = Utc::now();
                    entry.status = JobStatus::Cancelled;
                    entry.completed_at = Some(now);
                    entry.updated_at = now;
                    Some(JobEvent::Cancelled(entry.clone()))
                }
                JobStatus::Running => None,
                _ => return Ok(false),
            }
        };
        match event {
            Some(event) => {
                tracing::debug!("Job {id} cancelled while pending");
                self.state.events.publish(event);
            }
            None => {
                // Advisory only: the running handler decides when to stop.
                cancel_flag(&self.state, id).store(true, Ordering::Relaxed);
                tracing::debug!("Cancellation requested for running job {id}");
            }
        }
        Ok(true)
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let mut stats = QueueStats {
            backend: QueueBackendKind::Memory,
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            dead_letter: 0,
        };
        for entry in self.state.jobs.iter() {
            match entry.value().status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
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
        let state = self.state.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tracing::info!(
            concurrency = state.config.concurrency,
            poll_interval_ms = state.config.poll_interval_ms,
            "Memory job queue started"
        );
        tokio::spawn(async move {
            let poll_interval = Duration::from_millis(state.config.poll_interval_ms.max(1));
            loop {
                if *shutdown.borrow() {
                    break;
                }
                claim_and_spawn(&state);
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = time::sleep(poll_interval) => {}
                }
            }
            tracing::debug!("Memory queue scheduler loop exited");
        });
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        self.shutdown_tx.send_replace(true);

        let max_permits = self.state.config.concurrency.max(1) as u32;
        tracing::info!("Memory queue waiting for in-flight jobs to complete...");
        match time::timeout(DRAIN_TIMEOUT, self.state.semaphore.acquire_many(max_permits)).await {
            Ok(Ok(_permits)) => {}
            Ok(Err(_)) | Err(_) => {
                tracing::warn!("Timed out waiting for in-flight jobs to finish");
            }
        }
        tracing::info!("Memory job queue stopped");
        Ok(())
    }

    fn backend_kind(&self) -> QueueBackendKind {
        QueueBackendKind::Memory
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn cleanup_jobs(&self, older_than: Duration) -> AppResult<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| AppError::validation(format!("Invalid cleanup cutoff: {e}")))?;
        let before = self.state.jobs.len() as u64;
        self.state.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - self.state.jobs.len() as u64;
        if removed > 0 {
            tracing::info!("Cleaned up {removed} terminal jobs");
        }
        Ok(removed)
    }
}
