//! Durable job queue for scan runs
//!
//! Work units ("run the next phases of run X") are persisted in SQLite and
//! leased to a pool of workers. Failed jobs retry on a tiered backoff
//! schedule, expired leases are re-delivered by a stall reaper, and jobs
//! that exhaust either budget are dead-lettered so the owning run can be
//! failed with a durable reason.

mod error;
mod store;
mod worker;

pub use error::{HandlerError, QueueError};
pub use store::{JobDisposition, JobQueue, LeasedJob, QueueConfig, ReapedJob};
pub use worker::{JobHandler, WorkerPool};
