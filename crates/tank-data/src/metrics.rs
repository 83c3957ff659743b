//! Per-reading deltas, status classification and summary statistics.

use tank_core::models::{
    DailyAveragePolicy, DateRange, DerivedReading, Reading, StatusBreakdown, SummaryStats,
    TankSeries, TankStatus,
};
use tank_core::stats::{argmax, mean};

use crate::aggregator::SeriesAggregator;

/// Derive delta, elapsed time, rate and status for each reading.
///
/// The first reading has no predecessor and carries `None` everywhere. A
/// zero interval leaves the rate undefined but still classifies the status
/// from the delta sign.
pub fn derive(readings: Vec<Reading>) -> Vec<DerivedReading> {
    let mut derived: Vec<DerivedReading> = Vec::with_capacity(readings.len());
    let mut previous: Option<(chrono::DateTime<chrono::FixedOffset>, f64)> = None;

    for reading in readings {
        let current = (reading.timestamp, reading.volume_liters);
        let entry = match previous {
            None => DerivedReading::first(reading),
            Some((prev_ts, prev_volume)) => {
                let volume_delta = reading.volume_liters - prev_volume;
                let elapsed_seconds =
                    (reading.timestamp - prev_ts).num_milliseconds() as f64 / 1000.0;
                let usage_rate = if elapsed_seconds != 0.0 {
                    Some(volume_delta / elapsed_seconds)
                } else {
                    None
                };
                DerivedReading {
                    reading,
                    volume_delta: Some(volume_delta),
                    elapsed_seconds: Some(elapsed_seconds),
                    usage_rate,
                    status: Some(TankStatus::from_delta(volume_delta)),
                }
            }
        };
        previous = Some(current);
        derived.push(entry);
    }

    derived
}

// ── MetricEngine ──────────────────────────────────────────────────────────────

/// Computes [`SummaryStats`] for a tank series.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricEngine {
    policy: DailyAveragePolicy,
}

impl MetricEngine {
    pub fn new(policy: DailyAveragePolicy) -> Self {
        Self { policy }
    }

    /// Build a [`TankSeries`] from normalised readings.
    pub fn build_series(tank_id: &str, readings: Vec<Reading>) -> TankSeries {
        TankSeries::new(tank_id, derive(readings))
    }

    /// Summarise `series`. Never fails; undefined quantities are `None`
    /// or 0.
    pub fn summarize(&self, series: &TankSeries) -> SummaryStats {
        let readings = series.readings();
        if readings.is_empty() {
            return SummaryStats::empty();
        }

        let date_range = match (readings.first(), readings.last()) {
            (Some(first), Some(last)) => Some(DateRange {
                start: first.reading.date(),
                end: last.reading.date(),
            }),
            _ => None,
        };

        let total_volume_used: f64 = readings.iter().filter_map(|r| r.volume_delta).sum();

        let daily = SeriesAggregator::daily(readings);
        let average_daily_consumption = match (self.policy, &date_range) {
            (DailyAveragePolicy::PositiveDaysOnly, _) => {
                let positive: Vec<f64> =
                    daily.iter().map(|(_, sum)| sum).filter(|sum| *sum > 0.0).collect();
                mean(&positive).unwrap_or(0.0)
            }
            // Calendar days without readings count as zero.
            (DailyAveragePolicy::AllDays, Some(range)) => {
                let days = (range.end - range.start).num_days() + 1;
                daily.total() / days as f64
            }
            (DailyAveragePolicy::AllDays, None) => 0.0,
        };

        let peak_usage_hour = argmax(SeriesAggregator::hourly(readings).iter());

        let refill_intervals: Vec<f64> = readings
            .iter()
            .filter(|r| r.status == Some(TankStatus::Filling))
            .filter_map(|r| r.elapsed_seconds)
            .collect();
        let average_refill_time = mean(&refill_intervals);

        let mut status_time_breakdown = StatusBreakdown::default();
        for r in readings {
            if let (Some(status), Some(elapsed)) = (r.status, r.elapsed_seconds) {
                status_time_breakdown.add(status, elapsed);
            }
        }

        SummaryStats {
            date_range,
            total_readings: readings.len(),
            total_volume_used,
            average_daily_consumption,
            peak_usage_hour,
            average_refill_time,
            status_time_breakdown,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
