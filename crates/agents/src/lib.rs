//! Analysis agents for the LeadLens scan engine
//!
//! Each agent is an independent unit of analysis producing a typed result
//! and a confidence score through the structured-output model seam. The
//! runner enforces timeouts; persistence and retry policy belong to the
//! orchestrator, keeping agents pure and independently testable.

pub mod analyzers;
mod error;
mod model;
mod registry;
mod runner;

pub use analyzers::BUDGET_QUESTION_ID;
pub use error::AgentFailure;
pub use model::{HttpModelClient, ModelClient, ModelError};
pub use registry::AgentRegistry;
pub use runner::{AgentContext, AgentReport, AgentRunner, ScanAgent};
