use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
}

/// Infra-level failure reported by a job handler. Agent-level failures are
/// absorbed inside the handler and never surface here; anything that does
/// surface consumes the job's retry budget.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);
