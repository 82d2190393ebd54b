use std::time::Duration;

use thiserror::Error;

/// Failure of a single agent execution. Local to that agent: the
/// orchestrator records it and decides whether the phase survives.
#[derive(Error, Debug, Clone)]
pub enum AgentFailure {
    #[error("agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model output failed schema validation: {0}")]
    SchemaViolation(String),
}

impl AgentFailure {
    /// Stable taxonomy name carried on progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::SchemaViolation(_) => "schema_violation",
        }
    }
}
