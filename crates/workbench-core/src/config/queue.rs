//! Job queue configuration.

use serde::{Deserialize, Serialize};

/// Background job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue backend: `"memory"` or `"redis"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in milliseconds between scheduler polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Default maximum attempts for jobs that do not specify one.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,
    /// Base delay in milliseconds for exponential retry backoff.
    #[serde(default = "default_backoff_base")]
    pub retry_backoff_base_ms: u64,
    /// Upper bound in milliseconds for retry backoff.
    #[serde(default = "default_backoff_cap")]
    pub retry_backoff_cap_ms: u64,
    /// Visibility timeout in seconds for claimed jobs (redis backend).
    /// A worker that does not finish within the lease loses the job to
    /// the reclaimer.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
    /// Redis-specific queue configuration.
    #[serde(default)]
    pub redis: RedisQueueConfig,
}

impl QueueConfig {
    /// Compute the retry backoff for the given attempt count.
    ///
    /// `min(base * 2^(attempts - 1), cap)`, saturating.
    pub fn backoff_ms(&self, attempts: i32) -> u64 {
        let exp = (attempts - 1).clamp(0, 20) as u32;
        self.retry_backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.retry_backoff_cap_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            default_max_attempts: default_max_attempts(),
            retry_backoff_base_ms: default_backoff_base(),
            retry_backoff_cap_ms: default_backoff_cap(),
            lease_seconds: default_lease(),
            redis: RedisQueueConfig::default(),
        }
    }
}

/// Redis queue backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisQueueConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all workbench queue keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_concurrency() -> usize {
    3
}

fn default_poll_interval() -> u64 {
    200
}

fn default_max_attempts() -> i32 {
    3
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_cap() -> u64 {
    60_000
}

fn default_lease() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "workbench:queue:".to_string()
}
