//! Raw table → ordered, bounded [`Reading`] sequence.

use chrono::FixedOffset;
use tank_core::error::{Result, TankError};
use tank_core::models::{Reading, SignalKind};
use tank_core::time_utils::{apply_offset, parse_timestamp};
use tracing::debug;

use crate::reader::RawTable;

/// Timestamp column name.
pub const TIMESTAMP_COLUMN: &str = "created_at";
/// Percentage sensor column name.
pub const SIGNAL_COLUMN: &str = "field1";
/// Fallback column holding an already computed volume.
pub const VOLUME_COLUMN: &str = "water_liters";

// ── Schema ────────────────────────────────────────────────────────────────────

/// Column positions and signal interpretation for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub timestamp_index: usize,
    pub signal_index: usize,
    pub kind: SignalKind,
}

/// Locate the required columns after trimming and lowercasing the headers.
///
/// `field1` takes precedence over `water_liters` when both exist.
pub fn resolve_schema(headers: &[String]) -> Result<ResolvedSchema> {
    let normalised: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let position = |name: &str| normalised.iter().position(|h| h == name);

    let timestamp_index = position(TIMESTAMP_COLUMN);
    let signal = position(SIGNAL_COLUMN)
        .map(|i| (i, SignalKind::PercentageSignal))
        .or_else(|| position(VOLUME_COLUMN).map(|i| (i, SignalKind::DirectVolume)));

    match (timestamp_index, signal) {
        (Some(timestamp_index), Some((signal_index, kind))) => Ok(ResolvedSchema {
            timestamp_index,
            signal_index,
            kind,
        }),
        (ts, sig) => {
            let mut missing = Vec::new();
            if ts.is_none() {
                missing.push(TIMESTAMP_COLUMN.to_string());
            }
            if sig.is_none() {
                missing.push(SIGNAL_COLUMN.to_string());
            }
            Err(TankError::Schema {
                missing,
                found: normalised,
            })
        }
    }
}

// ── Normalizer ────────────────────────────────────────────────────────────────

/// Converts raw rows into readings for one tank.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    capacity: f64,
    offset: FixedOffset,
}

impl Normalizer {
    pub fn new(capacity: f64, offset: FixedOffset) -> Self {
        Self { capacity, offset }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Normalise `table` into readings sorted by timestamp.
    ///
    /// Rows with an unparseable timestamp are dropped; unparseable sensor
    /// values become 0. Fails only when a required column is missing.
    pub fn normalize(&self, table: &RawTable) -> Result<Vec<Reading>> {
        let schema = resolve_schema(table.headers())?;

        let mut readings = Vec::with_capacity(table.len());
        let mut dropped = 0usize;
        let mut coerced = 0usize;

        for row in table.rows() {
            let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

            let Some(ts) = parse_timestamp(cell(schema.timestamp_index)) else {
                dropped += 1;
                continue;
            };

            let raw_signal = match coerce_number(cell(schema.signal_index)) {
                Some(v) => v,
                None => {
                    coerced += 1;
                    0.0
                }
            };

            readings.push(Reading {
                timestamp: apply_offset(ts, self.offset),
                raw_signal,
                volume_liters: schema.kind.to_volume(raw_signal, self.capacity),
            });
        }

        debug!(
            "normalized {} rows: {} kept, {} dropped (bad timestamp), {} sensor values coerced to 0",
            table.len(),
            readings.len(),
            dropped,
            coerced
        );

        Ok(self.renormalize(readings))
    }

    /// Clip volumes into `[0, capacity]` and stable-sort by timestamp.
    ///
    /// Idempotent: applying it to its own output changes nothing. Readings
    /// sharing a timestamp keep their relative order.
    pub fn renormalize(&self, mut readings: Vec<Reading>) -> Vec<Reading> {
        for r in &mut readings {
            r.volume_liters = r.volume_liters.clamp(0.0, self.capacity);
        }
        readings.sort_by_key(|r| r.timestamp);
        readings
    }
}

/// Parse a sensor cell; `None` for empty, non-numeric or non-finite input.
fn coerce_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
