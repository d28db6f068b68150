//! Statement/Batch Executor
//!
//! Runs translated statements against the engine through a bounded cache of
//! prepared statements, and groups statements into one transaction on request.

mod executor;
mod health;

pub use executor::Executor;
pub use health::HealthStatus;
