//! Batch persistence: the queue-executed unit of work
//!
//! A job carries a page's raw records. The persister maps them to typed
//! rows, chunks them, and performs deduplicating inserts through the
//! [`EntityStore`] seam. Everything transient is absorbed here: chunk
//! inserts retry with a short increasing delay, duplicate collisions are
//! skipped and counted, and an abandoned chunk never takes the rest of the
//! job down with it. Only a total write outage — every chunk failed —
//! escalates to the queue for redelivery.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::MAX_CHUNK_SIZE;
use crate::entities::{EntityType, IncomeRow, OrderRow, RowBatch, SaleRow, StockRow, StorageRow};
use crate::error::{IngestError, Result};
use crate::queue::IngestionJob;

/// Attempts per chunk insert.
pub const CHUNK_RETRY_ATTEMPTS: u32 = 3;

/// Unit delay between chunk insert attempts (`base * attempt`).
pub const CHUNK_RETRY_BASE: Duration = Duration::from_millis(50);

/// Outcome of one deduplicating insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertStats {
    /// Rows actually written.
    pub inserted: u64,
    /// Rows skipped because their natural key already existed.
    pub skipped: u64,
}

/// Storage sink contract: insert rows, ignore natural-key duplicates,
/// report how many landed versus how many were skipped.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn insert_ignore(&self, batch: RowBatch) -> Result<InsertStats>;
}

/// What happened to one job, aggregated over its chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobReport {
    /// Records successfully mapped to rows.
    pub mapped: usize,
    /// Records dropped for missing natural-key fields.
    pub dropped: usize,
    pub inserted: u64,
    pub skipped: u64,
    pub chunks: usize,
    pub failed_chunks: usize,
}

/// Idempotent persistence of one page's records.
pub struct BatchPersister {
    store: Arc<dyn EntityStore>,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Run the job to completion. Per-chunk failures are absorbed; the only
    /// error is [`IngestError::AllChunksFailed`], which sends the job back
    /// through the queue's retry path.
    pub async fn execute(&self, job: &IngestionJob) -> Result<JobReport> {
        match job.entity_type {
            EntityType::Stocks => self.persist::<StockRow>(job).await,
            EntityType::Incomes => self.persist::<IncomeRow>(job).await,
            EntityType::Sales => self.persist::<SaleRow>(job).await,
            EntityType::Orders => self.persist::<OrderRow>(job).await,
        }
    }

    async fn persist<R: StorageRow>(&self, job: &IngestionJob) -> Result<JobReport> {
        let mut report = JobReport::default();
        if job.records.is_empty() {
            return Ok(report);
        }

        let rows: Vec<R> = job.records.iter().filter_map(R::from_api).collect();
        report.mapped = rows.len();
        report.dropped = job.records.len() - rows.len();
        if report.dropped > 0 {
            warn!(
                endpoint = %job.entity_type,
                page = job.page_number,
                dropped = report.dropped,
                "records missing natural-key fields were dropped"
            );
        }
        if rows.is_empty() {
            return Ok(report);
        }

        let chunk_size = job.chunk_size.clamp(1, MAX_CHUNK_SIZE);
        let mut last_error = String::new();

        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            report.chunks += 1;
            match self.insert_with_retry(R::into_batch(chunk.to_vec())).await {
                Ok(stats) => {
                    report.inserted += stats.inserted;
                    report.skipped += stats.skipped;
                    if stats.skipped > 0 {
                        warn!(
                            endpoint = %job.entity_type,
                            page = job.page_number,
                            chunk = index,
                            skipped = stats.skipped,
                            "duplicates skipped"
                        );
                    }
                }
                Err(err) => {
                    report.failed_chunks += 1;
                    last_error = err.to_string();
                    warn!(
                        endpoint = %job.entity_type,
                        page = job.page_number,
                        chunk = index,
                        error = %err,
                        "chunk abandoned after retries"
                    );
                }
            }
        }

        if report.inserted > 10 {
            info!(
                endpoint = %job.entity_type,
                page = job.page_number,
                inserted = report.inserted,
                "batch insert completed"
            );
        }

        if report.chunks > 0 && report.failed_chunks == report.chunks {
            return Err(IngestError::AllChunksFailed {
                endpoint: job.entity_type.endpoint(),
                page: job.page_number,
                chunks: report.chunks,
                detail: last_error,
            });
        }

        Ok(report)
    }

    async fn insert_with_retry(&self, batch: RowBatch) -> Result<InsertStats> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.insert_ignore(batch.clone()).await {
                Ok(stats) => return Ok(stats),
                Err(err) if attempt < CHUNK_RETRY_ATTEMPTS => {
                    debug!(attempt, error = %err, "chunk insert failed, retrying");
                    sleep(CHUNK_RETRY_BASE.saturating_mul(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sale_record(id: u32) -> serde_json::Value {
        serde_json::json!({
            "g_number": format!("G-{id}"),
            "date": "2026-08-01",
            "barcode": id,
            "sale_id": format!("S{id}"),
        })
    }

    fn sales_job(ids: std::ops::Range<u32>, chunk_size: usize) -> IngestionJob {
        IngestionJob::new(
            EntityType::Sales,
            1,
            chunk_size,
            ids.map(sale_record).collect(),
        )
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let persister = BatchPersister::new(store.clone());
        let job = sales_job(0..100, 500);

        let first = persister.execute(&job).await.unwrap();
        assert_eq!(first.inserted, 100);
        assert_eq!(first.skipped, 0);

        let second = persister.execute(&job).await.unwrap();
        assert_eq!(second.inserted, 0, "replay must add no net new rows");
        assert_eq!(second.skipped, 100);
        assert!(second.inserted <= first.inserted);
        assert_eq!(store.row_count("sales").await, 100);
    }

    #[tokio::test]
    async fn test_partial_overlap_counts_inserted_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        let persister = BatchPersister::new(store.clone());

        // 50 of the 500 rows already exist.
        persister.execute(&sales_job(0..50, 500)).await.unwrap();
        let report = persister.execute(&sales_job(0..500, 500)).await.unwrap();

        assert_eq!(report.inserted, 450);
        assert_eq!(report.skipped, 50);
        assert_eq!(store.row_count("sales").await, 500);
    }

    #[tokio::test]
    async fn test_unmappable_records_are_dropped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let persister = BatchPersister::new(store);

        let mut records: Vec<serde_json::Value> = (0..3).map(sale_record).collect();
        records.push(serde_json::json!({"date": "2026-08-01"}));

        let job = IngestionJob::new(EntityType::Sales, 1, 500, records);
        let report = persister.execute(&job).await.unwrap();
        assert_eq!(report.mapped, 3);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.inserted, 3);
    }

    #[tokio::test]
    async fn test_chunk_size_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let persister = BatchPersister::new(store);

        let job = sales_job(0..2500, 100_000);
        let report = persister.execute(&job).await.unwrap();
        // 2500 rows at the 1000-row ceiling means three chunks.
        assert_eq!(report.chunks, 3);
        assert_eq!(report.inserted, 2500);
    }

    /// Store that fails a configurable number of times, then succeeds.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl EntityStore for FlakyStore {
        async fn insert_ignore(&self, batch: RowBatch) -> Result<InsertStats> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IngestError::queue("transient lock contention"));
            }
            self.inner.insert_ignore(batch).await
        }
    }

    #[tokio::test]
    async fn test_transient_chunk_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let persister = BatchPersister::new(store);

        let report = persister.execute(&sales_job(0..10, 500)).await.unwrap();
        assert_eq!(report.inserted, 10);
        assert_eq!(report.failed_chunks, 0);
    }

    /// Store where every insert fails.
    struct BrokenStore;

    #[async_trait]
    impl EntityStore for BrokenStore {
        async fn insert_ignore(&self, _batch: RowBatch) -> Result<InsertStats> {
            Err(IngestError::queue("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_total_write_outage_escalates() {
        let persister = BatchPersister::new(Arc::new(BrokenStore));
        let err = persister.execute(&sales_job(0..10, 500)).await.unwrap_err();
        assert!(matches!(err, IngestError::AllChunksFailed { page: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_job_is_a_no_op() {
        let persister = BatchPersister::new(Arc::new(BrokenStore));
        let job = IngestionJob::new(EntityType::Sales, 1, 500, Vec::new());
        let report = persister.execute(&job).await.unwrap();
        assert_eq!(report.chunks, 0);
    }
}
