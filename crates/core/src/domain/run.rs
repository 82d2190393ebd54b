use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::plan::PendingQuestion;
use crate::domain::subject::ScanSubject;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    PhaseComplete,
    WaitingForUser,
    Review,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::PhaseComplete => "phase_complete",
            Self::WaitingForUser => "waiting_for_user",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "phase_complete" => Some(Self::PhaseComplete),
            "waiting_for_user" => Some(Self::WaitingForUser),
            "review" => Some(Self::Review),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Once a run reaches a terminal status, no further agent merges or
    /// phase transitions may be observed on it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One execution instance of the analysis pipeline for a subject.
///
/// The `completed_agents` / `failed_agents` collections are sets: the store
/// guarantees membership, not ordering. An agent never appears in both at
/// the same observed instant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    pub id: Uuid,
    pub subject_id: String,
    pub subject: ScanSubject,
    pub status: RunStatus,
    pub phase: Option<String>,
    pub progress: u8,
    pub completed_agents: Vec<String>,
    pub failed_agents: Vec<String>,
    pub agent_confidences: HashMap<String, u8>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(subject: ScanSubject) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id: subject.case_id.clone(),
            subject,
            status: RunStatus::default(),
            phase: None,
            progress: 0,
            completed_agents: Vec::new(),
            failed_agents: Vec::new(),
            agent_confidences: HashMap::new(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the agent has resolved (successfully or not) in this run.
    pub fn has_resolved(&self, agent: &str) -> bool {
        self.completed_agents.iter().any(|a| a == agent)
            || self.failed_agents.iter().any(|a| a == agent)
    }

    pub fn is_completed(&self, agent: &str) -> bool {
        self.completed_agents.iter().any(|a| a == agent)
    }
}

/// Point-in-time view of a run served to clients, both for polling and as
/// the catch-up snapshot at the head of a progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub subject_id: String,
    pub status: RunStatus,
    pub phase: Option<String>,
    pub progress: u8,
    pub completed_agents: Vec<String>,
    pub failed_agents: Vec<String>,
    pub agent_confidences: HashMap<String, u8>,
    pub pending_question: Option<PendingQuestion>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    pub fn from_run(run: &Run, pending_question: Option<PendingQuestion>) -> Self {
        Self {
            id: run.id,
            subject_id: run.subject_id.clone(),
            status: run.status,
            phase: run.phase.clone(),
            progress: run.progress,
            completed_agents: run.completed_agents.clone(),
            failed_agents: run.failed_agents.clone(),
            agent_confidences: run.agent_confidences.clone(),
            pending_question,
            failure_reason: run.failure_reason.clone(),
            created_at: run.created_at,
            updated_at: run.updated_at,
            completed_at: run.completed_at,
        }
    }
}

/// Result recorded for one agent within one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AgentRecord {
    pub confidence: u8,
    #[serde(default)]
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}
