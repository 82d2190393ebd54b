//! Durable store for scan runs.
//!
//! All mutation of a run row goes through this repository. Agent completion
//! and failure are merged with single conditional JSON1 updates executed
//! inside SQLite, never as read-modify-write in application code: concurrent
//! sibling completions must not overwrite each other.

use chrono::{DateTime, Utc};
use leadlens_core::{checkpoint, Checkpoint, Run, RunStatus, ScanSubject};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{datetime_to_timestamp, RunRow};

const RUN_COLUMNS: &str = "id, subject_id, subject, status, phase, progress, completed_agents, \
     failed_agents, agent_confidences, failure_reason, created_at, updated_at, completed_at";

/// Optional fields applied together with a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub progress: Option<u8>,
    pub phase: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new pending run for a subject.
    ///
    /// The insert and the "no active run for this subject" policy check are
    /// one statement, so two concurrent triggers for the same subject cannot
    /// both succeed.
    pub async fn create(&self, subject: &ScanSubject) -> Result<Run, DbError> {
        let run = Run::new(subject.clone());
        let row = RunRow::from(&run);

        let result = sqlx::query(
            r#"
            INSERT INTO runs (id, subject_id, subject, status, phase, progress,
                              completed_agents, failed_agents, agent_confidences,
                              failure_reason, created_at, updated_at, completed_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
            WHERE NOT EXISTS (
                SELECT 1 FROM runs
                WHERE subject_id = ?2
                  AND status NOT IN ('completed', 'failed', 'cancelled')
            )
            "#,
        )
        .bind(&row.id)
        .bind(&row.subject_id)
        .bind(&row.subject)
        .bind(&row.status)
        .bind(&row.phase)
        .bind(row.progress)
        .bind(&row.completed_agents)
        .bind(&row.failed_agents)
        .bind(&row.agent_confidences)
        .bind(&row.failure_reason)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(subject.case_id.clone()));
        }

        Ok(run)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Run>, DbError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Run>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Load and decode the run's checkpoint.
    ///
    /// A corrupt blob is logged and reported as "no checkpoint": callers
    /// replan instead of crashing. The run's durable agent sets survive
    /// either way.
    pub async fn load_checkpoint(&self, id: Uuid) -> Result<Option<Checkpoint>, DbError> {
        let blob: Option<Option<String>> =
            sqlx::query_scalar("SELECT checkpoint FROM runs WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        let Some(blob) = blob else {
            return Err(DbError::RunNotFound(id));
        };
        let Some(blob) = blob else {
            return Ok(None);
        };

        match checkpoint::decode(&blob) {
            Ok(cp) => Ok(Some(cp)),
            Err(e) => {
                tracing::warn!(run_id = %id, error = %e, "Corrupt checkpoint, treating as absent");
                Ok(None)
            }
        }
    }

    /// Full overwrite of the checkpoint blob plus the status and phase it
    /// implies: `waiting_for_user` iff a question is pending, else `running`.
    pub async fn save_checkpoint(&self, id: Uuid, cp: &Checkpoint) -> Result<(), DbError> {
        let blob = checkpoint::encode(cp).map_err(|e| DbError::Codec(e.to_string()))?;
        let status = if cp.pending_question.is_some() {
            RunStatus::WaitingForUser
        } else {
            RunStatus::Running
        };

        let result = sqlx::query(
            r#"
            UPDATE runs
            SET checkpoint = ?2, status = ?3, phase = ?4, updated_at = ?5
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .bind(&blob)
        .bind(status.as_str())
        .bind(&cp.phase)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.warn_if_terminal(id, "checkpoint write").await;
        }
        Ok(())
    }

    /// Record a successful agent completion.
    ///
    /// One conditional structural update: appends the agent to
    /// `completed_agents` only if absent, removes it from `failed_agents`
    /// (retry-then-succeed), and records the confidence. Safe for any number
    /// of sibling agents finishing in the same millisecond.
    pub async fn merge_agent_complete(
        &self,
        id: Uuid,
        agent: &str,
        confidence: u8,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET completed_agents = CASE
                    WHEN EXISTS (SELECT 1 FROM json_each(runs.completed_agents)
                                 WHERE json_each.value = ?2)
                        THEN completed_agents
                    ELSE json_insert(completed_agents, '$[#]', ?2)
                END,
                failed_agents = COALESCE((SELECT json_group_array(je.value)
                                          FROM json_each(runs.failed_agents) AS je
                                          WHERE je.value <> ?2), '[]'),
                agent_confidences = json_set(agent_confidences, '$.' || ?2, ?3),
                updated_at = ?4
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .bind(agent)
        .bind(confidence as i64)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.warn_if_terminal(id, "agent completion").await;
        }
        Ok(())
    }

    /// Record an agent failure. Appends to `failed_agents` unless the agent
    /// already succeeded or is already recorded as failed.
    pub async fn merge_agent_failed(&self, id: Uuid, agent: &str) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET failed_agents = CASE
                    WHEN EXISTS (SELECT 1 FROM json_each(runs.failed_agents)
                                 WHERE json_each.value = ?2)
                        THEN failed_agents
                    WHEN EXISTS (SELECT 1 FROM json_each(runs.completed_agents)
                                 WHERE json_each.value = ?2)
                        THEN failed_agents
                    ELSE json_insert(failed_agents, '$[#]', ?2)
                END,
                updated_at = ?3
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .bind(agent)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.warn_if_terminal(id, "agent failure").await;
        }
        Ok(())
    }

    /// Transition the run's status, optionally updating progress, phase,
    /// completion time and failure reason. Rejected once the run is
    /// terminal; progress only ever moves forward.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: RunStatus,
        extra: StatusUpdate,
    ) -> Result<(), DbError> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or(DbError::RunNotFound(id))?;
        if current.status.is_terminal() {
            return Err(DbError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?2,
                phase = COALESCE(?3, phase),
                progress = MAX(progress, COALESCE(?4, progress)),
                completed_at = COALESCE(?5, completed_at),
                failure_reason = COALESCE(?6, failure_reason),
                updated_at = ?7
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(extra.phase)
        .bind(extra.progress.map(|p| p as i64))
        .bind(extra.completed_at.map(datetime_to_timestamp))
        .bind(extra.failure_reason)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost a race against a concurrent terminal transition.
            return Err(DbError::InvalidTransition {
                from: "terminal".to_string(),
                to: status.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Monotone progress update; writes after terminal status are no-ops.
    pub async fn set_progress(&self, id: Uuid, progress: u8) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET progress = MAX(progress, ?2), updated_at = ?3
            WHERE id = ?1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .bind(progress as i64)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self.warn_if_terminal(id, "progress update").await;
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM runs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// A guarded write matched zero rows: either the run is gone (error) or
    /// it is terminal, in which case the write is deliberately discarded —
    /// a straggling agent must not resurrect a cancelled run.
    async fn warn_if_terminal(&self, id: Uuid, what: &str) -> Result<(), DbError> {
        match self.find_by_id(id).await? {
            Some(run) => {
                tracing::warn!(
                    run_id = %id,
                    status = %run.status.as_str(),
                    "Discarding {what} after terminal status"
                );
                Ok(())
            }
            None => Err(DbError::RunNotFound(id)),
        }
    }
}
