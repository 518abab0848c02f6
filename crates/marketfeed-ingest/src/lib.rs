//! Marketfeed Ingest Library
//!
//! Pulls paginated statistics (stocks, incomes, sales, orders) from a
//! rate-limited marketplace API and lands them in Postgres with
//! natural-key deduplication.
//!
//! The pipeline, leaf to root:
//!
//! - [`api::ApiClient`] fetches one page and classifies failures
//! - [`fetch::RetryingSingleFetcher`] adds bounded retry and backoff
//! - [`fetch::ConcurrentPageFetcher`] fans a page group over a bounded pool
//!   with a sequential fallback for the residue
//! - [`fetch::PaginationResolver`] discovers page counts, cached with a TTL
//! - [`queue::WorkQueue`] holds durable persistence jobs with at-least-once
//!   delivery and a dead-letter record
//! - [`persist::BatchPersister`] maps, chunks and insert-or-ignores a page's
//!   records
//! - [`supervisor::WorkerSupervisor`] owns worker lifecycle, dispatch and
//!   drain-with-timeout
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use marketfeed_ingest::config::IngestConfig;
//! use marketfeed_ingest::entities::EntityType;
//! use marketfeed_ingest::persist::MemoryStore;
//! use marketfeed_ingest::queue::MemoryQueue;
//! use marketfeed_ingest::supervisor::WorkerSupervisor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let queue = Arc::new(MemoryQueue::new(config.job_max_attempts));
//!     let store = Arc::new(MemoryStore::new());
//!     let supervisor = WorkerSupervisor::new(config, queue, store)?;
//!
//!     let date = chrono::Utc::now().date_naive();
//!     let summary = supervisor.run(&EntityType::ALL, date, date).await?;
//!     tracing::info!(jobs = summary.jobs_dispatched, "done");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod fetch;
pub mod persist;
pub mod queue;
pub mod supervisor;
pub mod worker;

pub use error::{IngestError, Result};
