use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One agent slot within a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AgentSpec {
    pub name: String,
    /// A phase fails only when every required agent in it has failed.
    #[serde(default)]
    pub required: bool,
}

impl AgentSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Question the pipeline raises after a phase completes, blocking further
/// progress until an external answer arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct QuestionSpec {
    pub id: String,
    pub prompt: String,
}

/// An ordered stage of the pipeline. Agents within a phase run concurrently;
/// phases run sequentially.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PhasePlan {
    pub name: String,
    pub agents: Vec<AgentSpec>,
    /// Interrogatory checkpoint raised once all agents of the phase resolve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionSpec>,
}

impl PhasePlan {
    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name.as_str())
    }

    pub fn required_agents(&self) -> impl Iterator<Item = &AgentSpec> {
        self.agents.iter().filter(|a| a.required)
    }
}

/// The full pipeline for one run, decided once at planning time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, Default)]
pub struct ScanPlan {
    pub phases: Vec<PhasePlan>,
}

impl ScanPlan {
    pub fn phase(&self, name: &str) -> Option<&PhasePlan> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn phase_index(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == name)
    }

    pub fn phase_after(&self, name: &str) -> Option<&PhasePlan> {
        let idx = self.phase_index(name)?;
        self.phases.get(idx + 1)
    }

    pub fn first_phase(&self) -> Option<&PhasePlan> {
        self.phases.first()
    }

    /// Every agent name across all phases, in plan order.
    pub fn all_agents(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|p| p.agents.iter().map(|a| a.name.clone()))
            .collect()
    }
}

/// A question the run is currently blocked on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PendingQuestion {
    pub id: String,
    pub prompt: String,
    /// Phase that raised the question.
    pub phase: String,
    pub asked_at: DateTime<Utc>,
}
