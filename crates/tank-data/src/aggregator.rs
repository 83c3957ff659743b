//! Daily, hourly and weekly bucketing of a derived reading series.

use std::collections::BTreeMap;

use tank_core::models::{DailyBuckets, DerivedReading, HourlyBuckets, WeeklyBuckets};

/// Stateless helper grouping derived readings by time bucket.
///
/// The three bucketings are independent and never mutate their input.
pub struct SeriesAggregator;

impl SeriesAggregator {
    /// Net volume change per local calendar date.
    ///
    /// Every date with a reading gets a bucket; readings without a delta
    /// contribute 0.
    pub fn daily(readings: &[DerivedReading]) -> DailyBuckets {
        DailyBuckets::from_map(Self::sum_deltas_by(readings, |r| r.reading.date()))
    }

    /// Mean usage rate per hour of day, across all dates.
    ///
    /// Only hours with at least one defined rate get a bucket.
    pub fn hourly(readings: &[DerivedReading]) -> HourlyBuckets {
        let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for r in readings {
            if let Some(rate) = r.usage_rate {
                let slot = acc.entry(r.reading.hour()).or_insert((0.0, 0));
                slot.0 += rate;
                slot.1 += 1;
            }
        }
        HourlyBuckets::from_map(
            acc.into_iter()
                .map(|(hour, (sum, n))| (hour, sum / n as f64))
                .collect(),
        )
    }

    /// Net volume change per ISO week (Monday start).
    pub fn weekly(readings: &[DerivedReading]) -> WeeklyBuckets {
        WeeklyBuckets::from_map(Self::sum_deltas_by(readings, |r| r.reading.iso_week()))
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Sum `volume_delta` per key. `BTreeMap` keeps keys sorted.
    fn sum_deltas_by<K: Ord>(
        readings: &[DerivedReading],
        key_fn: impl Fn(&DerivedReading) -> K,
    ) -> BTreeMap<K, f64> {
        let mut map: BTreeMap<K, f64> = BTreeMap::new();
        for r in readings {
            *map.entry(key_fn(r)).or_insert(0.0) += r.volume_delta.unwrap_or(0.0);
        }
        map
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
