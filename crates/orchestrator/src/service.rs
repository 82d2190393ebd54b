use chrono::Utc;
use db::{DbError, RunRepository, StatusUpdate};
use events::{ProgressBus, ScanEvent};
use leadlens_core::{Run, RunSnapshot, RunStatus, ScanSubject};
use queue::JobQueue;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::state_machine::RunStateMachine;

/// External interface of the scan engine: trigger, answer, read, cancel and
/// delete. Route handlers and CLI commands call this; the orchestrator
/// itself only ever runs inside queue workers.
#[derive(Clone)]
pub struct ScanService {
    runs: RunRepository,
    queue: JobQueue,
    bus: ProgressBus,
}

impl ScanService {
    pub fn new(runs: RunRepository, queue: JobQueue, bus: ProgressBus) -> Self {
        Self { runs, queue, bus }
    }

    /// Validate the subject, create the run and enqueue its first job.
    pub async fn trigger(&self, subject: ScanSubject) -> Result<Run> {
        subject.validate().map_err(|e| {
            let leadlens_core::CoreError::Validation(msg) = e;
            OrchestratorError::Validation(msg)
        })?;

        let run = match self.runs.create(&subject).await {
            Ok(run) => run,
            Err(DbError::Conflict(subject_id)) => {
                return Err(OrchestratorError::AlreadyRunning(subject_id))
            }
            Err(e) => return Err(e.into()),
        };

        self.queue.enqueue(run.id).await?;
        tracing::info!(run_id = %run.id, subject_id = %run.subject_id, "Scan run triggered");
        Ok(run)
    }

    /// Answer the question a run is blocked on and resume it.
    pub async fn answer(&self, run_id: Uuid, answer: String) -> Result<()> {
        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        if run.status != RunStatus::WaitingForUser {
            return Err(OrchestratorError::NotWaiting(run_id));
        }

        let Some(mut checkpoint) = self.runs.load_checkpoint(run_id).await? else {
            // Status says waiting but the blob is gone or corrupt; the next
            // execution will replan and re-raise the question.
            tracing::warn!(run_id = %run_id, "Waiting run has no readable checkpoint");
            return Err(OrchestratorError::NotWaiting(run_id));
        };
        let Some(question) = checkpoint.pending_question.take() else {
            return Err(OrchestratorError::NotWaiting(run_id));
        };

        checkpoint.answers.insert(question.id.clone(), answer);
        // No pending question any more: derives `running`.
        self.runs.save_checkpoint(run_id, &checkpoint).await?;
        self.bus.publish(
            run_id,
            ScanEvent::QuestionAnswered {
                question_id: question.id.clone(),
            },
        );
        self.queue.enqueue(run_id).await?;

        tracing::info!(run_id = %run_id, question = %question.id, "Question answered, run resumed");
        Ok(())
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Run> {
        self.runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Run>> {
        Ok(self.runs.list_recent(limit).await?)
    }

    /// Point-in-time view served to pollers and as the head of a progress
    /// stream. The pending question, when any, comes from the checkpoint.
    pub async fn snapshot(&self, run_id: Uuid) -> Result<RunSnapshot> {
        let run = self.get(run_id).await?;
        let pending_question = if run.status == RunStatus::WaitingForUser {
            self.runs
                .load_checkpoint(run_id)
                .await?
                .and_then(|cp| cp.pending_question)
        } else {
            None
        };
        Ok(RunSnapshot::from_run(&run, pending_question))
    }

    /// Cancel a run. In-flight agent calls are not force-killed; their
    /// results are discarded by the store's terminal guard when they land.
    pub async fn cancel(&self, run_id: Uuid) -> Result<()> {
        let run = self.get(run_id).await?;
        RunStateMachine::validate_transition(&run.status, &RunStatus::Cancelled)?;

        self.runs
            .set_status(
                run_id,
                RunStatus::Cancelled,
                StatusUpdate {
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        self.queue.cancel_pending(run_id).await?;
        self.bus.publish(run_id, ScanEvent::RunCancelled);

        tracing::info!(run_id = %run_id, "Run cancelled");
        Ok(())
    }

    /// Administrative delete: cancel first if still active, then remove the
    /// run row, its jobs and bus bookkeeping.
    pub async fn delete(&self, run_id: Uuid) -> Result<bool> {
        let Some(run) = self.runs.find_by_id(run_id).await? else {
            return Ok(false);
        };

        if !run.status.is_terminal() {
            match self.cancel(run_id).await {
                Ok(()) => {}
                // Raced with a concurrent terminal transition; keep deleting.
                Err(OrchestratorError::InvalidTransition { .. })
                | Err(OrchestratorError::Database(DbError::InvalidTransition { .. })) => {}
                Err(e) => return Err(e),
            }
        }

        self.queue.purge_run(run_id).await?;
        let deleted = self.runs.delete(run_id).await?;
        self.bus.forget_run(run_id);

        tracing::info!(run_id = %run_id, "Run deleted");
        Ok(deleted)
    }
}
