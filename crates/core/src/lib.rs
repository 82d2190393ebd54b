//! Domain types for the LeadLens scan engine
//!
//! This crate holds the pure data model shared by every other crate:
//! runs, scan plans, checkpoints and their codec. No I/O lives here.

pub mod checkpoint;
pub mod domain;
mod error;

pub use checkpoint::{decode, encode, Checkpoint, DecodeError, CHECKPOINT_SCHEMA_VERSION};
pub use domain::*;
pub use error::*;
