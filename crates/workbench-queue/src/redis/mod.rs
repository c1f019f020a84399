//! Redis-backed durable queue backend.

pub mod client;
pub mod keys;
pub mod queue;

pub use client::RedisClient;
pub use queue::RedisJobQueue;
