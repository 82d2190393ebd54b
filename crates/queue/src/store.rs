use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::QueueError;

/// Tiered retry delays by attempt number; the last tier repeats.
const BACKOFF_SECS: [i64; 5] = [10, 60, 300, 900, 1800];

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a worker may hold a lease before the job counts as stalled.
    pub lease_duration: Duration,
    /// Attempts before a nacked job is dead-lettered.
    pub max_attempts: u32,
    /// Stalled re-deliveries before a job is dead-lettered (poison bound).
    pub max_stalls: u32,
    /// Idle worker poll interval.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(300),
            max_attempts: 5,
            max_stalls: 3,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A job currently held by a worker.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub id: Uuid,
    pub run_id: Uuid,
    pub attempt: u32,
}

/// Outcome of a nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// Re-queued; runs again after the given delay.
    Retry { delay: Duration },
    /// Retry budget exhausted; the job is dead and the run must be failed.
    Dead,
}

/// A stalled job recovered by the reaper.
#[derive(Debug, Clone)]
pub struct ReapedJob {
    pub run_id: Uuid,
    pub dead: bool,
}

#[derive(sqlx::FromRow)]
struct LeasedRow {
    id: String,
    run_id: String,
    attempt: i64,
}

/// Durable queue of scan jobs, backed by the shared SQLite pool.
///
/// Mutual exclusion is structural: a partial unique index allows at most one
/// queued-or-leased job per run, and a lease claim is a single conditional
/// `UPDATE ... RETURNING`, so two workers can never hold the same run.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(pool: SqlitePool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a job for a run. Returns false (and does nothing) when the
    /// run already has a queued or leased job.
    pub async fn enqueue(&self, run_id: Uuid) -> Result<bool, QueueError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs
                (id, run_id, status, attempt, stall_count, available_at, created_at, updated_at)
            VALUES (?1, ?2, 'queued', 0, 0, ?3, ?3, ?3)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(run_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the oldest available job for a worker.
    pub async fn lease(&self, worker: &str) -> Result<Option<LeasedJob>, QueueError> {
        let now = Utc::now().timestamp();
        let expires = now + self.config.lease_duration.as_secs() as i64;

        let row: Option<LeasedRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'leased', worker = ?1, lease_expires_at = ?2, updated_at = ?3
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'queued' AND available_at <= ?3
                ORDER BY available_at
                LIMIT 1
            )
            RETURNING id, run_id, attempt
            "#,
        )
        .bind(worker)
        .bind(expires)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| LeasedJob {
            id: Uuid::parse_str(&r.id).unwrap_or_default(),
            run_id: Uuid::parse_str(&r.run_id).unwrap_or_default(),
            attempt: r.attempt as u32,
        }))
    }

    /// Acknowledge successful completion of a leased job.
    pub async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'done', updated_at = ? WHERE id = ? AND status = 'leased'",
        )
        .bind(Utc::now().timestamp())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    /// Report a failed execution. The job either re-queues on the backoff
    /// schedule or, past `max_attempts`, is dead-lettered.
    pub async fn nack(&self, job_id: Uuid, error: &str) -> Result<JobDisposition, QueueError> {
        let attempt: Option<i64> =
            sqlx::query_scalar("SELECT attempt FROM jobs WHERE id = ? AND status = 'leased'")
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        let Some(attempt) = attempt else {
            return Err(QueueError::JobNotFound(job_id));
        };

        let next_attempt = attempt as u32 + 1;
        let now = Utc::now().timestamp();

        if next_attempt >= self.config.max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = 'dead', attempt = ?, last_error = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(next_attempt as i64)
            .bind(error)
            .bind(now)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;

            tracing::warn!(job_id = %job_id, attempts = next_attempt, "Job dead-lettered");
            return Ok(JobDisposition::Dead);
        }

        let delay = backoff_for_attempt(attempt as u32);
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', attempt = ?, available_at = ?, last_error = ?,
                worker = NULL, lease_expires_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(next_attempt as i64)
        .bind(now + delay.as_secs() as i64)
        .bind(error)
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(JobDisposition::Retry { delay })
    }

    /// Recover jobs whose lease expired without an ack. Each stalled job
    /// returns to the queue until `max_stalls`, then is dead-lettered.
    pub async fn reap_stalled(&self) -> Result<Vec<ReapedJob>, QueueError> {
        let now = Utc::now().timestamp();
        let max_stalls = self.config.max_stalls as i64;

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET stall_count = stall_count + 1,
                status = CASE WHEN stall_count + 1 >= ?1 THEN 'dead' ELSE 'queued' END,
                worker = NULL, lease_expires_at = NULL, updated_at = ?2
            WHERE status = 'leased' AND lease_expires_at <= ?2
            RETURNING run_id, status
            "#,
        )
        .bind(max_stalls)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let reaped: Vec<ReapedJob> = rows
            .into_iter()
            .map(|(run_id, status)| ReapedJob {
                run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
                dead: status == "dead",
            })
            .collect();

        for job in &reaped {
            tracing::warn!(run_id = %job.run_id, dead = job.dead, "Stalled job reaped");
        }
        Ok(reaped)
    }

    /// Remove queued (not leased) jobs for a run, e.g. on cancellation.
    pub async fn cancel_pending(&self, run_id: Uuid) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE run_id = ? AND status = 'queued'")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove every job for a run (administrative delete).
    pub async fn purge_run(&self, run_id: Uuid) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Job counts by status, for operational tooling.
    pub async fn counts(&self) -> Result<Vec<(String, i64)>, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let idx = (attempt as usize).min(BACKOFF_SECS.len() - 1);
    Duration::from_secs(BACKOFF_SECS[idx] as u64)
}
