//! Progress event system for the LeadLens scan engine
//!
//! This crate provides the progress bus and the event types the
//! orchestrator publishes while a scan run executes. Delivery is
//! fire-and-forget: the run store remains the source of truth, the bus is
//! an optimization for low-latency live updates.

mod bus;
mod types;

pub use bus::ProgressBus;
pub use types::*;
