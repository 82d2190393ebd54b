//! Checkpoint codec
//!
//! A checkpoint is the durable, resumable snapshot of orchestrator state for
//! one run, stored as an opaque blob on the run row. The codec must stay
//! compatible in both directions: unknown top-level keys are ignored when
//! decoding (a newer writer may add fields), and missing optional keys decode
//! as absent. A `schema_version` discriminant gates migrations; blobs written
//! by a schema this build does not know are rejected rather than guessed at.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AgentRecord, PendingQuestion, ScanPlan, ScanSubject};

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    1
}

/// Per-phase results keyed by agent name.
pub type PhaseResults = HashMap<String, HashMap<String, AgentRecord>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Current phase; always a member of `plan`.
    pub phase: String,
    pub plan: ScanPlan,
    #[serde(default)]
    pub phase_results: PhaseResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<PendingQuestion>,
    /// Answers to previously raised questions, keyed by question id.
    #[serde(default)]
    pub answers: HashMap<String, String>,
    pub subject: ScanSubject,
}

impl Checkpoint {
    /// Create the first checkpoint of a run, positioned at `phase`.
    pub fn new(subject: ScanSubject, plan: ScanPlan, phase: impl Into<String>) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            phase: phase.into(),
            plan,
            phase_results: PhaseResults::new(),
            pending_question: None,
            answers: HashMap::new(),
            subject,
        }
    }

    pub fn results_for(&self, phase: &str) -> Option<&HashMap<String, AgentRecord>> {
        self.phase_results.get(phase)
    }

    pub fn record_result(&mut self, phase: &str, agent: &str, record: AgentRecord) {
        self.phase_results
            .entry(phase.to_string())
            .or_default()
            .insert(agent.to_string(), record);
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed checkpoint: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported checkpoint schema version {0}")]
    UnsupportedVersion(u32),

    #[error("checkpoint phase {0:?} is not part of its plan")]
    UnknownPhase(String),
}

pub fn encode(checkpoint: &Checkpoint) -> Result<String, serde_json::Error> {
    serde_json::to_string(checkpoint)
}

pub fn decode(blob: &str) -> Result<Checkpoint, DecodeError> {
    let checkpoint: Checkpoint = serde_json::from_str(blob)?;

    if checkpoint.schema_version > CHECKPOINT_SCHEMA_VERSION {
        return Err(DecodeError::UnsupportedVersion(checkpoint.schema_version));
    }
    if checkpoint.plan.phase(&checkpoint.phase).is_none() {
        return Err(DecodeError::UnknownPhase(checkpoint.phase));
    }

    Ok(checkpoint)
}
