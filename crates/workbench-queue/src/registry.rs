//! Handler registry — dispatch table from job type to executor.

use std::sync::Arc;

use dashmap::DashMap;
use tracing;

use workbench_entity::job::kind::JobType;

use crate::handler::JobHandler;

/// Maps each job type to its registered handler.
///
/// Re-registering a type overwrites the previous handler (last write wins),
/// which is how tests swap in fresh handlers and how a restarted process
/// re-attaches its executors.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a job handler. Last write wins.
    pub fn register(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, handler).is_some() {
            tracing::info!("Replaced job handler for type '{}'", job_type);
        } else {
            tracing::info!("Registered job handler for type '{}'", job_type);
        }
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).map(|h| Arc::clone(h.value()))
    }

    /// Check if a handler is registered for a job type.
    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Get the list of registered job types.
    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.iter().map(|entry| *entry.key()).collect()
    }
}
