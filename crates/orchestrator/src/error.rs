use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run is not waiting for input: {0}")]
    NotWaiting(Uuid),

    #[error("An active scan already exists for subject: {0}")]
    AlreadyRunning(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Checkpoint phase {0:?} is not part of its plan")]
    UnknownPhase(String),

    #[error("Scan plan contains no phases")]
    EmptyPlan,

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
