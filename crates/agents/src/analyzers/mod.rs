//! The built-in analysis agents.
//!
//! Deliberately thin: each agent builds a prompt, declares the schema it
//! expects back, and validates the structured output. Scoring heuristics
//! live on the model side.

mod accessibility;
mod budget;
mod performance;
mod tech_stack;

pub use accessibility::AccessibilityAgent;
pub use budget::{BudgetAgent, BUDGET_QUESTION_ID};
pub use performance::PerformanceAgent;
pub use tech_stack::TechStackAgent;
