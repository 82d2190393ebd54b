mod health;
mod scans;
pub mod sse;

pub use health::*;
pub use scans::*;
