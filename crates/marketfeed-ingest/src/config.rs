//! Ingestion configuration
//!
//! Environment-driven configuration for the API client, the worker pool and
//! the drain loop. `API_BASE_URL` and `API_KEY` are required; everything
//! else has defaults tuned for the remote service's published limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Hard cap the remote API places on the `limit` query parameter.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Ceiling on rows per INSERT statement, whatever the job asks for.
pub const MAX_CHUNK_SIZE: usize = 1000;

/// Hard ceiling on simultaneously in-flight page requests.
pub const MAX_POOL_SIZE: usize = 50;

/// Remote API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the statistics API, without a trailing slash.
    pub base_url: String,
    /// API key passed as the `key` query parameter.
    pub api_key: String,
    /// Total per-request timeout in seconds.
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Attempts per page before giving up.
    pub max_retries: u32,
    /// Base delay for transport-failure backoff in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("API_BASE_URL")
            .map_err(|_| IngestError::config("API_BASE_URL environment variable is required"))?;
        let api_key = std::env::var("API_KEY")
            .map_err(|_| IngestError::config("API_KEY environment variable is required"))?;

        let config = Self {
            base_url,
            api_key,
            timeout_secs: env_parse("API_TIMEOUT_SECS", 30),
            connect_timeout_secs: env_parse("API_CONNECT_TIMEOUT_SECS", 10),
            max_retries: env_parse("API_MAX_RETRIES", 3),
            retry_base_delay_ms: env_parse("API_RETRY_BASE_DELAY_MS", 1000),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(IngestError::config("API_BASE_URL cannot be empty"));
        }
        if self.api_key.is_empty() {
            return Err(IngestError::config("API_KEY cannot be empty"));
        }
        if self.max_retries == 0 {
            return Err(IngestError::config("API_MAX_RETRIES must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Pipeline-wide settings: fetch concurrency, worker pool, queue and drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub api: ApiConfig,
    /// Postgres connection string. Not required for dry runs.
    pub database_url: Option<String>,
    /// Number of long-running queue consumers.
    pub workers: usize,
    /// Pages fetched per concurrent group.
    pub concurrent: usize,
    /// Items requested per page; capped at [`MAX_PAGE_SIZE`].
    pub page_size: u32,
    /// Rows per INSERT chunk; capped at [`MAX_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Seconds between queue-depth polls while draining.
    pub drain_poll_secs: u64,
    /// Wall-clock budget for the drain phase in seconds.
    pub drain_budget_secs: u64,
    /// Grace period for in-flight jobs at shutdown, in seconds.
    pub worker_grace_secs: u64,
    /// Worker sleep when the queue is empty, in seconds.
    pub worker_idle_sleep_secs: u64,
    /// Seconds after which a reservation is considered stale and reclaimable.
    pub queue_retry_after_secs: u64,
    /// Deliveries before a job is dead-lettered.
    pub job_max_attempts: i32,
    /// Time-to-live for cached page counts, in seconds.
    pub page_cache_ttl_secs: u64,
    /// Pause between page groups in milliseconds.
    pub group_pause_ms: u64,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api: ApiConfig::from_env()?,
            database_url: std::env::var("DATABASE_URL").ok(),
            workers: env_parse("INGEST_WORKERS", 8),
            concurrent: env_parse("INGEST_CONCURRENT", 30),
            page_size: env_parse("INGEST_PAGE_SIZE", MAX_PAGE_SIZE),
            chunk_size: env_parse("INGEST_CHUNK_SIZE", 500),
            drain_poll_secs: env_parse("INGEST_DRAIN_POLL_SECS", 10),
            drain_budget_secs: env_parse("INGEST_DRAIN_BUDGET_SECS", 1800),
            worker_grace_secs: env_parse("INGEST_WORKER_GRACE_SECS", 3),
            worker_idle_sleep_secs: env_parse("INGEST_WORKER_IDLE_SLEEP_SECS", 3),
            queue_retry_after_secs: env_parse("INGEST_QUEUE_RETRY_AFTER_SECS", 300),
            job_max_attempts: env_parse("INGEST_JOB_MAX_ATTEMPTS", 5),
            page_cache_ttl_secs: env_parse("INGEST_PAGE_CACHE_TTL_SECS", 1800),
            group_pause_ms: env_parse("INGEST_GROUP_PAUSE_MS", 100),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IngestError::config("INGEST_WORKERS must be greater than 0"));
        }
        if self.concurrent == 0 {
            return Err(IngestError::config("INGEST_CONCURRENT must be greater than 0"));
        }
        if self.page_size == 0 {
            return Err(IngestError::config("INGEST_PAGE_SIZE must be greater than 0"));
        }
        if self.chunk_size == 0 {
            return Err(IngestError::config("INGEST_CHUNK_SIZE must be greater than 0"));
        }
        if self.job_max_attempts <= 0 {
            return Err(IngestError::config(
                "INGEST_JOB_MAX_ATTEMPTS must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Postgres connection string, or a configuration error when the run
    /// actually needs a database.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| IngestError::config("DATABASE_URL environment variable is required"))
    }

    /// Effective page size after applying the remote cap.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.min(MAX_PAGE_SIZE)
    }

    /// Effective chunk size after applying the insert ceiling.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.min(MAX_CHUNK_SIZE)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_secs(self.drain_poll_secs)
    }

    pub fn drain_budget(&self) -> Duration {
        Duration::from_secs(self.drain_budget_secs)
    }

    pub fn worker_grace(&self) -> Duration {
        Duration::from_secs(self.worker_grace_secs)
    }

    pub fn worker_idle_sleep(&self) -> Duration {
        Duration::from_secs(self.worker_idle_sleep_secs)
    }

    pub fn page_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.page_cache_ttl_secs)
    }

    pub fn group_pause(&self) -> Duration {
        Duration::from_millis(self.group_pause_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_api_config() -> ApiConfig {
        ApiConfig {
            base_url: "https://api.example.com".to_string(),
            api_key: "secret".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }

    fn test_ingest_config() -> IngestConfig {
        IngestConfig {
            api: test_api_config(),
            database_url: None,
            workers: 8,
            concurrent: 30,
            page_size: 500,
            chunk_size: 500,
            drain_poll_secs: 10,
            drain_budget_secs: 1800,
            worker_grace_secs: 3,
            worker_idle_sleep_secs: 3,
            queue_retry_after_secs: 300,
            job_max_attempts: 5,
            page_cache_ttl_secs: 1800,
            group_pause_ms: 100,
        }
    }

    #[test]
    fn test_api_config_validation_valid() {
        assert!(test_api_config().validate().is_ok());
    }

    #[test]
    fn test_api_config_validation_empty_key() {
        let mut config = test_api_config();
        config.api_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_config_validation_zero_retries() {
        let mut config = test_api_config();
        config.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ingest_config_validation_zero_workers() {
        let mut config = test_ingest_config();
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_capped_at_remote_limit() {
        let mut config = test_ingest_config();
        config.page_size = 2000;
        assert_eq!(config.effective_page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_chunk_size_capped_at_insert_ceiling() {
        let mut config = test_ingest_config();
        config.chunk_size = 5000;
        assert_eq!(config.effective_chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_require_database_url_absent() {
        let config = test_ingest_config();
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = test_ingest_config();
        assert_eq!(config.drain_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.drain_budget(), Duration::from_secs(1800));
        assert_eq!(config.worker_grace(), Duration::from_secs(3));
        assert_eq!(config.group_pause(), Duration::from_millis(100));
    }
}
