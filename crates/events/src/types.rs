//! Event types published on the progress bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata.
///
/// `seq` is a per-run monotone sequence assigned by the bus at publish
/// time. Subscribers use it to reconcile a storage snapshot with the live
/// tail: events with a sequence at or below the snapshot cutoff are
/// already reflected in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: ScanEvent,
}

impl EventEnvelope {
    pub fn new(run_id: Uuid, seq: u64, event: ScanEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            seq,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All progress events a scan run can emit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A pipeline phase started; lists the agents about to run.
    #[serde(rename = "phase.started")]
    PhaseStarted { phase: String, agents: Vec<String> },

    #[serde(rename = "agent.started")]
    AgentStarted { phase: String, agent: String },

    #[serde(rename = "agent.completed")]
    AgentCompleted {
        phase: String,
        agent: String,
        confidence: u8,
    },

    /// One agent attempt failed; `kind` is the failure taxonomy
    /// (timeout, transport, schema_violation).
    #[serde(rename = "agent.failed")]
    AgentFailed {
        phase: String,
        agent: String,
        kind: String,
        message: String,
    },

    #[serde(rename = "progress")]
    ProgressUpdated { progress: u8 },

    /// The run paused on an interrogatory checkpoint.
    #[serde(rename = "question.raised")]
    QuestionRaised { question_id: String, prompt: String },

    #[serde(rename = "question.answered")]
    QuestionAnswered { question_id: String },

    #[serde(rename = "run.completed")]
    RunCompleted,

    #[serde(rename = "run.failed")]
    RunFailed {
        reason: String,
        failed_agents: Vec<String>,
    },

    #[serde(rename = "run.cancelled")]
    RunCancelled,

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl ScanEvent {
    /// Stable event name used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "phase.started",
            Self::AgentStarted { .. } => "agent.started",
            Self::AgentCompleted { .. } => "agent.completed",
            Self::AgentFailed { .. } => "agent.failed",
            Self::ProgressUpdated { .. } => "progress",
            Self::QuestionRaised { .. } => "question.raised",
            Self::QuestionAnswered { .. } => "question.answered",
            Self::RunCompleted => "run.completed",
            Self::RunFailed { .. } => "run.failed",
            Self::RunCancelled => "run.cancelled",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event reports a terminal run status. Live streams end
    /// after delivering one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted | Self::RunFailed { .. } | Self::RunCancelled
        )
    }
}
