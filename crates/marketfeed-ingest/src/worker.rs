//! Queue consumer
//!
//! A worker is a long-running task: claim a job, run the persister, ack or
//! fail, repeat. Workers share nothing with each other — the queue's
//! reservation semantics are the only coordination. Cancellation is checked
//! between jobs; an in-flight job always runs to its own completion (the
//! supervisor enforces the grace period).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::persist::BatchPersister;
use crate::queue::{ClaimedJob, WorkQueue};

pub struct IngestWorker {
    id: usize,
    queue: Arc<dyn WorkQueue>,
    persister: Arc<BatchPersister>,
    idle_sleep: Duration,
    cancel: CancellationToken,
}

impl IngestWorker {
    pub fn new(
        id: usize,
        queue: Arc<dyn WorkQueue>,
        persister: Arc<BatchPersister>,
        idle_sleep: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            persister,
            idle_sleep,
            cancel,
        }
    }

    /// Consume jobs until cancelled.
    pub async fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.queue.claim().await {
                Ok(Some(claim)) => self.process(claim).await,
                Ok(None) => {
                    if self.idle_or_cancelled().await {
                        break;
                    }
                }
                Err(err) => {
                    warn!(worker = self.id, error = %err, "queue claim failed");
                    if self.idle_or_cancelled().await {
                        break;
                    }
                }
            }
        }

        debug!(worker = self.id, "worker stopped");
    }

    /// Sleep the idle interval; true means cancellation arrived instead.
    async fn idle_or_cancelled(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = sleep(self.idle_sleep) => false,
        }
    }

    async fn process(&self, claim: ClaimedJob) {
        let endpoint = claim.job.entity_type;
        let page = claim.job.page_number;

        match self.persister.execute(&claim.job).await {
            Ok(report) => {
                debug!(
                    worker = self.id,
                    endpoint = %endpoint,
                    page,
                    inserted = report.inserted,
                    skipped = report.skipped,
                    failed_chunks = report.failed_chunks,
                    "job completed"
                );
                if let Err(err) = self.queue.complete(&claim).await {
                    warn!(worker = self.id, job_id = %claim.id, error = %err, "failed to ack job");
                }
            }
            Err(err) => {
                error!(
                    worker = self.id,
                    endpoint = %endpoint,
                    page,
                    attempt = claim.attempts,
                    error = %err,
                    "job execution failed"
                );
                if let Err(fail_err) = self.queue.fail(&claim, &err.to_string()).await {
                    warn!(worker = self.id, job_id = %claim.id, error = %fail_err, "failed to record job failure");
                }
            }
        }
    }
}
