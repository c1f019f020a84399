//! Queue factory — selects and caches the configured backend.
//!
//! An explicit object passed to consumers by dependency injection; there is
//! no module-level singleton. `reset` tears the cached instance down so the
//! next `get` re-reads configuration and may come back with a different
//! backend. Handlers never carry over across a reset — each new instance
//! starts with an empty registry and must have its handlers re-registered.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use workbench_core::AppResult;
use workbench_core::config::queue::QueueConfig;
use workbench_core::error::AppError;

use crate::backend::JobQueue;
use crate::memory::MemoryJobQueue;
use crate::redis::RedisJobQueue;

type ConfigLoader = Box<dyn Fn() -> QueueConfig + Send + Sync>;

/// Factory for job queue instances.
pub struct QueueFactory {
    loader: ConfigLoader,
    current: Mutex<Option<Arc<dyn JobQueue>>>,
}

impl std::fmt::Debug for QueueFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueFactory").finish()
    }
}

impl QueueFactory {
    /// Create a factory that always constructs from the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_loader(move || config.clone())
    }

    /// Create a factory that re-reads configuration through `loader` every
    /// time it constructs an instance. This is what lets a `reset` followed
    /// by a configuration change switch backend types without restarting
    /// the process.
    pub fn with_loader(loader: impl Fn() -> QueueConfig + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            current: Mutex::new(None),
        }
    }

    /// Get the shared queue instance, constructing and starting it on first
    /// use. Subsequent calls return the same instance until [`reset`](Self::reset).
    pub async fn get(&self) -> AppResult<Arc<dyn JobQueue>> {
        let mut current = self.current.lock().await;
        if let Some(queue) = current.as_ref() {
            return Ok(Arc::clone(queue));
        }
        let queue = self.build().await?;
        *current = Some(Arc::clone(&queue));
        Ok(queue)
    }

    /// Construct a fresh, started instance independent of the shared one.
    /// Used by tests that need isolation.
    pub async fn create(&self) -> AppResult<Arc<dyn JobQueue>> {
        self.build().await
    }

    /// Stop and drop the shared instance. The next [`get`](Self::get)
    /// re-reads configuration and builds a new one.
    pub async fn reset(&self) -> AppResult<()> {
        let mut current = self.current.lock().await;
        if let Some(queue) = current.take() {
            queue.stop().await?;
            info!("Queue instance reset; next get() re-reads configuration");
        }
        Ok(())
    }

    async fn build(&self) -> AppResult<Arc<dyn JobQueue>> {
        let config = (self.loader)();
        let queue: Arc<dyn JobQueue> = match config.backend.as_str() {
            "redis" => {
                info!("Initializing redis job queue backend");
                Arc::new(RedisJobQueue::connect(config).await?)
            }
            "memory" => {
                info!("Initializing in-memory job queue backend");
                Arc::new(MemoryJobQueue::new(config))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown queue backend: '{other}'. Supported: memory, redis"
                )));
            }
        };
        queue.start().await?;
        Ok(queue)
    }
}
