//! Durable work queue for persistence jobs
//!
//! At-least-once FIFO job store with reservation semantics: a claimed job is
//! invisible to other workers until it completes, fails, or its reservation
//! goes stale. Jobs that exhaust their delivery attempts land in a
//! dead-letter record — observable, never silently gone.

pub mod memory;
pub mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PgWorkQueue;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::EntityType;
use crate::error::Result;

/// Delays before redelivering a failed job, indexed by delivery attempt.
/// Attempts beyond the schedule reuse the final entry.
pub const RETRY_BACKOFF_SECS: [u64; 5] = [15, 30, 60, 120, 240];

/// Backoff before the next delivery after `attempt` failed (1-based).
pub fn retry_backoff(attempt: i32) -> Duration {
    let index = (attempt.max(1) as usize - 1).min(RETRY_BACKOFF_SECS.len() - 1);
    Duration::from_secs(RETRY_BACKOFF_SECS[index])
}

/// Durable payload: "persist these already-fetched records".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub entity_type: EntityType,
    pub page_number: u32,
    pub chunk_size: usize,
    pub records: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IngestionJob {
    pub fn new(
        entity_type: EntityType,
        page_number: u32,
        chunk_size: usize,
        records: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            entity_type,
            page_number,
            chunk_size,
            records,
            created_at: Utc::now(),
        }
    }
}

/// A job a worker holds exclusively. `attempts` counts this delivery.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub attempts: i32,
    pub job: IngestionJob,
}

/// Aggregate queue depth, derived on demand and never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Jobs waiting for a worker (including ones parked for retry backoff).
    pub pending: i64,
    /// Jobs currently reserved by a worker.
    pub reserved: i64,
}

impl QueueCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.reserved
    }
}

/// Record of a job that exhausted its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub job_id: Uuid,
    pub payload: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// The queue store contract. Claim must be atomic: two workers can never
/// hold the same job at the same time.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a job.
    async fn enqueue(&self, job: IngestionJob) -> Result<()>;

    /// Atomically reserve the next available job, if any.
    async fn claim(&self) -> Result<Option<ClaimedJob>>;

    /// Acknowledge successful execution; the job is gone afterwards.
    async fn complete(&self, claim: &ClaimedJob) -> Result<()>;

    /// Record a failed delivery: release for redelivery with backoff, or
    /// dead-letter once attempts are exhausted.
    async fn fail(&self, claim: &ClaimedJob, error: &str) -> Result<()>;

    /// Current pending/reserved depth.
    async fn counts(&self) -> Result<QueueCounts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_schedule() {
        assert_eq!(retry_backoff(1), Duration::from_secs(15));
        assert_eq!(retry_backoff(3), Duration::from_secs(60));
        assert_eq!(retry_backoff(5), Duration::from_secs(240));
        // Beyond the schedule, the last delay repeats.
        assert_eq!(retry_backoff(9), Duration::from_secs(240));
        // Defensive lower bound.
        assert_eq!(retry_backoff(0), Duration::from_secs(15));
    }

    #[test]
    fn test_job_payload_round_trip() {
        let job = IngestionJob::new(
            EntityType::Sales,
            3,
            500,
            vec![serde_json::json!({"sale_id": "S1"})],
        );
        let value = serde_json::to_value(&job).unwrap();
        let back: IngestionJob = serde_json::from_value(value).unwrap();
        assert_eq!(back.entity_type, EntityType::Sales);
        assert_eq!(back.page_number, 3);
        assert_eq!(back.records.len(), 1);
    }

    #[test]
    fn test_counts_total() {
        let counts = QueueCounts { pending: 4, reserved: 2 };
        assert_eq!(counts.total(), 6);
    }
}
