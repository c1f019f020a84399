//! In-process, non-persistent queue backend.

pub mod queue;

pub use queue::MemoryJobQueue;
