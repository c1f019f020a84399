//! # workbench-queue
//!
//! Background job queue for the Sentiment Workbench. Two interchangeable
//! backends sit behind the [`JobQueue`] trait:
//!
//! - **memory**: an in-process scheduler with no durability — all state is
//!   lost on restart, by design
//! - **redis**: a durable scheduler whose jobs survive restarts, with
//!   lease-based crash recovery, exponential retry backoff, and a
//!   dead-letter list for exhausted jobs
//!
//! The backend is selected at runtime by [`QueueFactory`] based on
//! configuration. Handlers are registered per job type; lifecycle events
//! are published on a broadcast channel.

pub mod backend;
pub mod events;
pub mod factory;
pub mod handler;
pub mod memory;
pub mod redis;
pub mod registry;

pub use backend::{JobQueue, QueueBackendKind, QueueStats};
pub use events::{JobEvent, JobEventBus};
pub use factory::QueueFactory;
pub use handler::{JobContext, JobExecutionError, JobHandler};
pub use memory::MemoryJobQueue;
pub use self::redis::RedisJobQueue;
pub use registry::HandlerRegistry;
