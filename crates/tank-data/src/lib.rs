//! Tank telemetry pipeline.
//!
//! Reads raw CSV feeds, normalises them into bounded volume readings,
//! derives per-reading metrics, aggregates them into daily, hourly and
//! weekly buckets, flags anomalous usage rates and combines every tank into
//! one comparison table. [`report`] and [`export`] turn a finished batch
//! into its presentation form.

pub mod aggregator;
pub mod analysis;
pub mod anomaly;
pub mod combiner;
pub mod export;
pub mod metrics;
pub mod normalizer;
pub mod reader;
pub mod report;

pub use tank_core as core;
