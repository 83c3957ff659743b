//! Shared types for the tank monitor: data model, error taxonomy,
//! configuration, timestamp handling and numeric helpers.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod stats;
pub mod time_utils;

pub use error::{Result, TankError};
