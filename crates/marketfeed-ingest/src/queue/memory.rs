//! In-memory work queue
//!
//! Same contract as the Postgres queue minus durability and timed backoff:
//! a failed job goes straight back to the end of the line. Used by dry runs
//! and tests, where waiting out a redelivery schedule helps nobody.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{IngestError, Result};

use super::{ClaimedJob, DeadLetter, IngestionJob, QueueCounts, WorkQueue};

struct StoredJob {
    id: Uuid,
    attempts: i32,
    job: IngestionJob,
}

#[derive(Default)]
struct State {
    pending: VecDeque<StoredJob>,
    reserved: HashMap<Uuid, StoredJob>,
    dead: Vec<DeadLetter>,
}

pub struct MemoryQueue {
    max_attempts: i32,
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new(max_attempts: i32) -> Self {
        Self {
            max_attempts,
            state: Mutex::new(State::default()),
        }
    }

    /// Snapshot of the dead-letter records accumulated so far.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead.clone()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, job: IngestionJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state.pending.push_back(StoredJob {
            id: Uuid::new_v4(),
            attempts: 0,
            job,
        });
        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>> {
        let mut state = self.state.lock().await;
        let Some(mut stored) = state.pending.pop_front() else {
            return Ok(None);
        };

        stored.attempts += 1;
        let claim = ClaimedJob {
            id: stored.id,
            attempts: stored.attempts,
            job: stored.job.clone(),
        };
        state.reserved.insert(stored.id, stored);
        Ok(Some(claim))
    }

    async fn complete(&self, claim: &ClaimedJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .reserved
            .remove(&claim.id)
            .map(|_| ())
            .ok_or_else(|| IngestError::queue(format!("job {} was not reserved", claim.id)))
    }

    async fn fail(&self, claim: &ClaimedJob, error_detail: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .reserved
            .remove(&claim.id)
            .ok_or_else(|| IngestError::queue(format!("job {} was not reserved", claim.id)))?;

        if stored.attempts >= self.max_attempts {
            error!(job_id = %stored.id, error = error_detail, "job moved to dead letter");
            let payload = serde_json::to_value(&stored.job)?;
            state.dead.push(DeadLetter {
                id: Uuid::new_v4(),
                job_id: stored.id,
                payload,
                error: error_detail.to_string(),
                failed_at: Utc::now(),
            });
        } else {
            warn!(
                job_id = %stored.id,
                attempt = stored.attempts,
                max_attempts = self.max_attempts,
                error = error_detail,
                "job failed, requeued"
            );
            state.pending.push_back(stored);
        }
        Ok(())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let state = self.state.lock().await;
        Ok(QueueCounts {
            pending: state.pending.len() as i64,
            reserved: state.reserved.len() as i64,
        })
    }
}
