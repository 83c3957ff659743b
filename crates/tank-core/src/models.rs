use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Capacity (litres) assumed for every tank without an explicit override.
pub const DEFAULT_TANK_CAPACITY: f64 = 10_000.0;

// ── Status ────────────────────────────────────────────────────────────────────

/// What a tank was doing over the interval ending at a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankStatus {
    /// Volume increased since the previous reading.
    Filling,
    /// Volume decreased since the previous reading.
    Draining,
    /// Volume unchanged.
    Idle,
}

impl TankStatus {
    /// Classify by the sign of a volume change.
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            TankStatus::Filling
        } else if delta < 0.0 {
            TankStatus::Draining
        } else {
            TankStatus::Idle
        }
    }
}

// ── Schema resolution ─────────────────────────────────────────────────────────

/// How the sensor column of a feed is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// `field1`: fill level as a 0–100 percentage of capacity.
    PercentageSignal,
    /// `water_liters`: an already computed volume in litres.
    DirectVolume,
}

impl SignalKind {
    /// Convert a raw sensor value into litres for a tank of `capacity`.
    ///
    /// The result is not clipped.
    pub fn to_volume(self, raw: f64, capacity: f64) -> f64 {
        match self {
            SignalKind::PercentageSignal => (raw / 100.0) * capacity,
            SignalKind::DirectVolume => raw,
        }
    }
}

// ── Readings ──────────────────────────────────────────────────────────────────

/// One timestamped, normalised volume observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Observation time expressed in the configured local offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Sensor value as read from the feed (after numeric coercion).
    pub raw_signal: f64,
    /// Volume in litres, always within `[0, capacity]`.
    pub volume_liters: f64,
}

impl Reading {
    /// Calendar date of the local wall-clock time.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Local hour of day, 0–23.
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    /// ISO week containing the local date.
    pub fn iso_week(&self) -> IsoWeek {
        IsoWeek::from_date(self.date())
    }
}

/// A [`Reading`] plus the quantities derived from its predecessor.
///
/// The first reading of a series has no predecessor, so every derived field
/// is `None`. `usage_rate` is also `None` when two readings share a
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedReading {
    pub reading: Reading,
    pub volume_delta: Option<f64>,
    pub elapsed_seconds: Option<f64>,
    pub usage_rate: Option<f64>,
    pub status: Option<TankStatus>,
}

impl DerivedReading {
    /// A reading with no predecessor.
    pub fn first(reading: Reading) -> Self {
        Self {
            reading,
            volume_delta: None,
            elapsed_seconds: None,
            usage_rate: None,
            status: None,
        }
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.reading.timestamp
    }

    pub fn volume_liters(&self) -> f64 {
        self.reading.volume_liters
    }
}

/// The derived reading sequence of one tank. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TankSeries {
    tank_id: String,
    readings: Vec<DerivedReading>,
}

impl TankSeries {
    pub fn new(tank_id: impl Into<String>, readings: Vec<DerivedReading>) -> Self {
        Self {
            tank_id: tank_id.into(),
            readings,
        }
    }

    pub fn tank_id(&self) -> &str {
        &self.tank_id
    }

    pub fn readings(&self) -> &[DerivedReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Every defined usage rate, in series order.
    pub fn usage_rates(&self) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().filter_map(|r| r.usage_rate)
    }
}

// ── Summary ───────────────────────────────────────────────────────────────────

/// First and last local calendar dates covered by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Cumulative seconds spent in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub filling_seconds: f64,
    pub draining_seconds: f64,
    pub idle_seconds: f64,
}

impl StatusBreakdown {
    pub fn add(&mut self, status: TankStatus, seconds: f64) {
        match status {
            TankStatus::Filling => self.filling_seconds += seconds,
            TankStatus::Draining => self.draining_seconds += seconds,
            TankStatus::Idle => self.idle_seconds += seconds,
        }
    }

    pub fn get(&self, status: TankStatus) -> f64 {
        match status {
            TankStatus::Filling => self.filling_seconds,
            TankStatus::Draining => self.draining_seconds,
            TankStatus::Idle => self.idle_seconds,
        }
    }

    pub fn total(&self) -> f64 {
        self.filling_seconds + self.draining_seconds + self.idle_seconds
    }
}

/// Per-tank summary statistics at full internal precision.
///
/// `None` fields are the "N/A" sentinels of the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub date_range: Option<DateRange>,
    pub total_readings: usize,
    /// Net sum of every defined volume delta, litres.
    pub total_volume_used: f64,
    pub average_daily_consumption: f64,
    pub peak_usage_hour: Option<u32>,
    /// Mean interval length (seconds) of Filling readings.
    pub average_refill_time: Option<f64>,
    pub status_time_breakdown: StatusBreakdown,
}

impl SummaryStats {
    /// The degenerate summary of a tank with no valid readings.
    pub fn empty() -> Self {
        Self {
            date_range: None,
            total_readings: 0,
            total_volume_used: 0.0,
            average_daily_consumption: 0.0,
            peak_usage_hour: None,
            average_refill_time: None,
            status_time_breakdown: StatusBreakdown::default(),
        }
    }
}

/// Which days contribute to `average_daily_consumption`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyAveragePolicy {
    /// Only days whose net delta sum is positive.
    #[default]
    #[serde(rename = "positive")]
    PositiveDaysOnly,
    /// Every calendar day from the first reading to the last, whatever its
    /// sign. Days without readings count as zero.
    #[serde(rename = "all")]
    AllDays,
}

impl FromStr for DailyAveragePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(DailyAveragePolicy::PositiveDaysOnly),
            "all" => Ok(DailyAveragePolicy::AllDays),
            other => Err(format!("unknown daily average policy: {}", other)),
        }
    }
}

// ── Buckets ───────────────────────────────────────────────────────────────────

/// An ISO-8601 calendar week (Monday start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

impl IsoWeek {
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Label in the form `2024-W03`.
    pub fn label(&self) -> String {
        format!("{}-W{:02}", self.year, self.week)
    }
}

impl fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Ordered mapping from a bucket key to an aggregated value.
///
/// Keys iterate in ascending order: chronological for dates and weeks,
/// numeric for hours.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket<K: Ord> {
    values: BTreeMap<K, f64>,
}

impl<K: Ord> Default for AggregateBucket<K> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> AggregateBucket<K> {
    pub fn from_map(values: BTreeMap<K, f64>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: K) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all bucket values.
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }
}

/// Net volume change per local calendar date.
pub type DailyBuckets = AggregateBucket<NaiveDate>;
/// Mean usage rate per hour of day (0–23, across all dates).
pub type HourlyBuckets = AggregateBucket<u32>;
/// Net volume change per ISO week.
pub type WeeklyBuckets = AggregateBucket<IsoWeek>;

// ── Comparison ────────────────────────────────────────────────────────────────

/// One long-form row of the cross-tank comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub timestamp: DateTime<FixedOffset>,
    pub volume_liters: f64,
    pub tank_id: String,
}

/// Every tank's readings in one table, tanks in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn new(rows: Vec<ComparisonRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// Where a tank's CSV feed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    File(PathBuf),
    Url(String),
}

impl SourceLocation {
    /// Interpret a configured source string according to the ingest mode.
    pub fn from_mode(source: &str, from_csv: bool) -> Self {
        if from_csv {
            SourceLocation::File(PathBuf::from(source))
        } else {
            SourceLocation::Url(source.to_string())
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::File(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => f.write_str(url),
        }
    }
}

/// A tank to analyse: identity, feed location and physical capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct TankSource {
    pub id: String,
    pub location: SourceLocation,
    pub capacity: f64,
}

// ── Date window ───────────────────────────────────────────────────────────────

/// Inclusive calendar window applied to displayed results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
