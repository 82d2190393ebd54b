//! Scan run orchestration
//!
//! Owns the phase sequence of a run: plans the pipeline from the subject,
//! fans out the current phase's agents on bounded concurrency, merges every
//! resolution into the run store immediately, checkpoints between phases,
//! pauses on interrogatory checkpoints and resumes from the last durable
//! checkpoint after a crash. The orchestrator itself is stateless between
//! job executions; everything durable lives in the run row and checkpoint.

mod error;
mod handler;
mod orchestrator;
mod planner;
mod service;
mod state_machine;

pub use error::{OrchestratorError, Result};
pub use handler::ScanJobHandler;
pub use self::orchestrator::{OrchestratorConfig, ScanOrchestrator};
pub use planner::{build_plan, PHASE_DISCOVERY, PHASE_ESTIMATE, PHASE_SITE_AUDIT};
pub use service::ScanService;
pub use state_machine::RunStateMachine;
