//! Batch runtime for the tank monitor.
//!
//! Wraps feed reading with retries and runs every tank's pipeline on the
//! tokio blocking pool behind a join barrier.

pub mod loader;
pub mod orchestrator;

pub use tank_core as core;
pub use tank_data as data;
