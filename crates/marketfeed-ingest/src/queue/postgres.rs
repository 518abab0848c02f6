//! Postgres-backed work queue
//!
//! One row per job in `ingest_jobs`; claims go through
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never double-process.
//! Reservations older than `retry_after` are considered abandoned (a worker
//! died mid-job) and become claimable again. Exhausted jobs move to
//! `ingest_failed_jobs`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::Result;

use super::{
    retry_backoff, ClaimedJob, IngestionJob, QueueCounts, WorkQueue,
};

#[derive(Debug, Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
    retry_after: Duration,
    max_attempts: i32,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool, retry_after: Duration, max_attempts: i32) -> Self {
        Self {
            pool,
            retry_after,
            max_attempts,
        }
    }

    /// Move a job to the dead-letter table and drop it from the queue.
    async fn dead_letter(
        &self,
        job_id: Uuid,
        payload: serde_json::Value,
        error_detail: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO ingest_failed_jobs (id, job_id, payload, error, failed_at) \
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(payload)
        .bind(error_detail)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM ingest_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        error!(job_id = %job_id, error = error_detail, "job moved to dead letter");
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, job: IngestionJob) -> Result<()> {
        let payload = serde_json::to_value(&job)?;

        sqlx::query(
            "INSERT INTO ingest_jobs (id, payload, attempts, available_at, created_at) \
             VALUES ($1, $2, 0, now(), now())",
        )
        .bind(Uuid::new_v4())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>> {
        // A job with an undecodable payload is dead-lettered on the spot and
        // the claim is retried, so one poison row cannot stall a worker.
        loop {
            let row: Option<(Uuid, serde_json::Value, i32)> = sqlx::query_as(
                "UPDATE ingest_jobs \
                 SET reserved_at = now(), attempts = attempts + 1 \
                 WHERE id = ( \
                     SELECT id FROM ingest_jobs \
                     WHERE (reserved_at IS NULL \
                            OR reserved_at < now() - make_interval(secs => $1)) \
                       AND available_at <= now() \
                     ORDER BY created_at \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING id, payload, attempts",
            )
            .bind(self.retry_after.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;

            let Some((id, payload, attempts)) = row else {
                return Ok(None);
            };

            match serde_json::from_value::<IngestionJob>(payload.clone()) {
                Ok(job) => return Ok(Some(ClaimedJob { id, attempts, job })),
                Err(err) => {
                    warn!(job_id = %id, error = %err, "undecodable job payload");
                    self.dead_letter(id, payload, &format!("undecodable payload: {err}"))
                        .await?;
                }
            }
        }
    }

    async fn complete(&self, claim: &ClaimedJob) -> Result<()> {
        sqlx::query("DELETE FROM ingest_jobs WHERE id = $1")
            .bind(claim.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, claim: &ClaimedJob, error_detail: &str) -> Result<()> {
        if claim.attempts >= self.max_attempts {
            let payload = serde_json::to_value(&claim.job)?;
            return self.dead_letter(claim.id, payload, error_detail).await;
        }

        let delay = retry_backoff(claim.attempts);
        sqlx::query(
            "UPDATE ingest_jobs \
             SET reserved_at = NULL, \
                 available_at = now() + make_interval(secs => $1) \
             WHERE id = $2",
        )
        .bind(delay.as_secs_f64())
        .bind(claim.id)
        .execute(&self.pool)
        .await?;

        warn!(
            job_id = %claim.id,
            attempt = claim.attempts,
            max_attempts = self.max_attempts,
            retry_in_secs = delay.as_secs(),
            error = error_detail,
            "job failed, scheduled for redelivery"
        );
        Ok(())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let (pending, reserved): (i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE reserved_at IS NULL), \
                 COUNT(*) FILTER (WHERE reserved_at IS NOT NULL) \
             FROM ingest_jobs",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueCounts { pending, reserved })
    }
}
