//! Ingestion run supervisor
//!
//! Owns the whole lifecycle of one run: start a fixed pool of queue
//! workers, fetch and enqueue every endpoint's pages, wait for the queue to
//! drain, stop the workers. Progress and totals travel through explicit
//! return values, never shared mutable state.
//!
//! Per run the supervisor moves through Starting, one FetchingEndpoint
//! stage per entity type, Draining, and Stopped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{ApiClient, FetchRequest};
use crate::config::IngestConfig;
use crate::entities::EntityType;
use crate::error::Result;
use crate::fetch::{ConcurrentPageFetcher, PageSink, PaginationResolver, RetryPolicy, RetryingSingleFetcher};
use crate::persist::{BatchPersister, EntityStore};
use crate::queue::{IngestionJob, WorkQueue};
use crate::worker::IngestWorker;

/// Consecutive zero readings of the pending count required before the
/// queue is considered drained. A single zero can be a claim-to-commit
/// window, not completion.
pub const DRAIN_STABLE_POLLS: u32 = 3;

/// Pause after spawning workers before fetching begins.
const WORKER_SETTLE: Duration = Duration::from_secs(2);

/// How the drain phase ended. A timeout is a liveness bound being hit,
/// not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    TimedOut,
}

/// Per-endpoint result of the fetch/enqueue stage.
#[derive(Debug, Clone)]
pub struct EndpointReport {
    pub entity: EntityType,
    /// Resolved page count; `None` means discovery failed and the endpoint
    /// was skipped.
    pub pages: Option<u32>,
    pub jobs_dispatched: usize,
    pub items_accepted: usize,
}

/// Aggregate result of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub jobs_dispatched: usize,
    pub items_accepted: usize,
    pub endpoints: Vec<EndpointReport>,
    pub drain: DrainOutcome,
}

/// Tracks the drain stability requirement over successive pending counts.
#[derive(Debug, Default)]
pub struct DrainTracker {
    last: Option<i64>,
    stable: u32,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one pending-count reading; true once the count has been zero
    /// for [`DRAIN_STABLE_POLLS`] consecutive readings.
    pub fn observe(&mut self, pending: i64) -> bool {
        if pending == 0 {
            self.stable = if self.last == Some(0) { self.stable + 1 } else { 1 };
        } else {
            self.stable = 0;
        }
        self.last = Some(pending);
        self.stable >= DRAIN_STABLE_POLLS
    }
}

/// Sink that turns non-empty pages into queue jobs.
struct QueueSink {
    queue: Arc<dyn WorkQueue>,
    entity: EntityType,
    chunk_size: usize,
    jobs: AtomicUsize,
}

#[async_trait]
impl PageSink for QueueSink {
    async fn accept(&self, records: Vec<serde_json::Value>, page: u32) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len();
        self.queue
            .enqueue(IngestionJob::new(self.entity, page, self.chunk_size, records))
            .await?;
        self.jobs.fetch_add(1, Ordering::Relaxed);
        info!(endpoint = %self.entity, page, items = count, "page queued for insert");
        Ok(count)
    }
}

/// Drives an ingestion run end to end.
pub struct WorkerSupervisor {
    config: IngestConfig,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn EntityStore>,
    fetcher: ConcurrentPageFetcher,
    resolver: PaginationResolver,
}

impl WorkerSupervisor {
    pub fn new(
        config: IngestConfig,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn EntityStore>,
    ) -> Result<Self> {
        let client = ApiClient::new(&config.api)?;
        let policy = RetryPolicy::from_api_config(&config.api);
        let single = RetryingSingleFetcher::new(client.clone(), policy);
        let fetcher = ConcurrentPageFetcher::new(client, single.clone());
        let resolver = PaginationResolver::new(single, config.page_cache_ttl());

        Ok(Self {
            config,
            queue,
            store,
            fetcher,
            resolver,
        })
    }

    /// Run one full ingestion pass over `endpoints` for the date range.
    pub async fn run(
        &self,
        endpoints: &[EntityType],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<RunSummary> {
        let cancel = CancellationToken::new();
        let handles = self.start_workers(&cancel);
        sleep(WORKER_SETTLE).await;

        let mut reports = Vec::with_capacity(endpoints.len());
        for &entity in endpoints {
            info!(endpoint = %entity, "=== processing endpoint ===");
            match self.process_endpoint(entity, date_from, date_to).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    // Enqueue failures are systemic; stop cleanly and bail.
                    error!(endpoint = %entity, error = %err, "dispatch failed");
                    self.stop_workers(cancel, handles).await;
                    return Err(err);
                }
            }
        }

        let jobs_dispatched: usize = reports.iter().map(|r| r.jobs_dispatched).sum();
        let items_accepted: usize = reports.iter().map(|r| r.items_accepted).sum();
        info!(jobs_dispatched, items_accepted, "all endpoints dispatched");

        let drain = self.drain().await;
        self.stop_workers(cancel, handles).await;

        Ok(RunSummary {
            jobs_dispatched,
            items_accepted,
            endpoints: reports,
            drain,
        })
    }

    fn start_workers(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!(workers = self.config.workers, "starting queue workers");
        let persister = Arc::new(BatchPersister::new(self.store.clone()));

        (0..self.config.workers)
            .map(|id| {
                let worker = IngestWorker::new(
                    id,
                    self.queue.clone(),
                    persister.clone(),
                    self.config.worker_idle_sleep(),
                    cancel.child_token(),
                );
                tokio::spawn(worker.run())
            })
            .collect()
    }

    async fn process_endpoint(
        &self,
        entity: EntityType,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<EndpointReport> {
        let mut effective_from = date_from;
        if entity.pins_date_to_today() {
            let today = Utc::now().date_naive();
            if effective_from != today {
                info!(endpoint = %entity, date = %today, "endpoint serves current-day data, overriding dateFrom");
                effective_from = today;
            }
        }

        let page_size = self.config.effective_page_size();
        let Some(total_pages) = self
            .resolver
            .resolve(entity, effective_from, date_to, page_size)
            .await
        else {
            error!(endpoint = %entity, "failed to resolve page count, skipping endpoint");
            return Ok(EndpointReport {
                entity,
                pages: None,
                jobs_dispatched: 0,
                items_accepted: 0,
            });
        };

        info!(endpoint = %entity, total_pages, "resolved page count");

        let sink = QueueSink {
            queue: self.queue.clone(),
            entity,
            chunk_size: self.config.effective_chunk_size(),
            jobs: AtomicUsize::new(0),
        };
        let base = FetchRequest::new(entity, effective_from, date_to, 1, page_size);

        let pages: Vec<u32> = (1..=total_pages).collect();
        let group_count = pages.chunks(self.config.concurrent).count();
        let mut items_accepted = 0;

        for (index, group) in pages.chunks(self.config.concurrent).enumerate() {
            info!(
                endpoint = %entity,
                group = index + 1,
                groups = group_count,
                first_page = group.first().copied().unwrap_or(0),
                last_page = group.last().copied().unwrap_or(0),
                "processing page group"
            );

            items_accepted += self.fetcher.fetch_pages(&base, group, &sink).await?;

            if index + 1 < group_count {
                sleep(self.config.group_pause()).await;
            }
        }

        info!(endpoint = %entity, items_accepted, "endpoint completed");
        Ok(EndpointReport {
            entity,
            pages: Some(total_pages),
            jobs_dispatched: sink.jobs.load(Ordering::Relaxed),
            items_accepted,
        })
    }

    /// Poll queue depth until drained or out of budget. Polling errors mean
    /// "keep waiting", not "abort".
    async fn drain(&self) -> DrainOutcome {
        info!("waiting for queued jobs to complete");
        let deadline = Instant::now() + self.config.drain_budget();
        let mut tracker = DrainTracker::new();

        loop {
            if Instant::now() >= deadline {
                warn!("drain budget exhausted, stopping workers anyway");
                return DrainOutcome::TimedOut;
            }

            match self.queue.counts().await {
                Ok(counts) => {
                    info!(pending = counts.pending, reserved = counts.reserved, "queue depth");
                    if tracker.observe(counts.pending) {
                        info!("queue drained");
                        return DrainOutcome::Drained;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "could not check queue status");
                }
            }

            sleep(self.config.drain_poll_interval()).await;
        }
    }

    async fn stop_workers(&self, cancel: CancellationToken, handles: Vec<JoinHandle<()>>) {
        info!("stopping queue workers");
        cancel.cancel();

        for (index, handle) in handles.into_iter().enumerate() {
            let abort = handle.abort_handle();
            match timeout(self.config.worker_grace(), handle).await {
                Ok(_) => info!(worker = index, "worker stopped"),
                Err(_) => {
                    abort.abort();
                    warn!(worker = index, "worker exceeded grace period, aborted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::persist::MemoryStore;
    use crate::queue::MemoryQueue;

    #[test]
    fn test_drain_tracker_requires_three_consecutive_zeros() {
        let mut tracker = DrainTracker::new();
        let readings = [5, 2, 0, 3, 0, 0, 0];
        let complete: Vec<bool> = readings.iter().map(|&p| tracker.observe(p)).collect();

        assert_eq!(complete, [false, false, false, false, false, false, true]);
    }

    #[test]
    fn test_drain_tracker_isolated_zero_is_not_completion() {
        let mut tracker = DrainTracker::new();
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(1));
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(0));
        assert!(tracker.observe(0));
    }

    fn test_config(drain_budget_secs: u64) -> IngestConfig {
        IngestConfig {
            api: ApiConfig {
                base_url: "http://localhost:1".to_string(),
                api_key: "k".to_string(),
                timeout_secs: 1,
                connect_timeout_secs: 1,
                max_retries: 1,
                retry_base_delay_ms: 1,
            },
            database_url: None,
            workers: 1,
            concurrent: 30,
            page_size: 500,
            chunk_size: 500,
            drain_poll_secs: 10,
            drain_budget_secs,
            worker_grace_secs: 3,
            worker_idle_sleep_secs: 3,
            queue_retry_after_secs: 300,
            job_max_attempts: 5,
            page_cache_ttl_secs: 1800,
            group_pause_ms: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_when_queue_never_empties() {
        let queue = Arc::new(MemoryQueue::new(3));
        queue
            .enqueue(IngestionJob::new(
                EntityType::Orders,
                1,
                500,
                vec![serde_json::json!({"g_number": "G", "date": "2026-08-02", "barcode": 1})],
            ))
            .await
            .unwrap();

        let supervisor = WorkerSupervisor::new(
            test_config(120),
            queue,
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        // No workers are running, so the pending count never drops.
        assert_eq!(supervisor.drain().await, DrainOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_completes_on_stable_empty_queue() {
        let queue = Arc::new(MemoryQueue::new(3));
        let supervisor = WorkerSupervisor::new(
            test_config(1800),
            queue,
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        assert_eq!(supervisor.drain().await, DrainOutcome::Drained);
    }
}
