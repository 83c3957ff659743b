//! Per-tank and batch analysis pipeline.
//!
//! Each tank runs read → normalise → derive → aggregate → detect on its own
//! data; the combiner only runs once every tank has finished. A failure in
//! one tank is recorded in its [`TankOutcome`] and never stops the others.

use std::time::Instant;

use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tank_core::error::{Result, TankError};
use tank_core::models::{
    ComparisonTable, DailyAveragePolicy, DailyBuckets, DerivedReading, HourlyBuckets, Reading,
    SummaryStats, TankSeries, TankSource, WeeklyBuckets,
};
use tank_core::settings::RunConfig;
use tank_core::time_utils::default_offset;
use tracing::{debug, info, warn};

use crate::aggregator::SeriesAggregator;
use crate::anomaly::{AnomalyDetector, AnomalyThreshold, DEFAULT_SIGMA};
use crate::combiner::combine;
use crate::metrics::MetricEngine;
use crate::normalizer::Normalizer;
use crate::reader::{FeedReader, RawTable};

// ── Options ───────────────────────────────────────────────────────────────────

/// Analysis parameters shared by every tank of a batch.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub utc_offset: FixedOffset,
    pub anomaly_sigma: f64,
    pub daily_policy: DailyAveragePolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            utc_offset: default_offset(),
            anomaly_sigma: DEFAULT_SIGMA,
            daily_policy: DailyAveragePolicy::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            utc_offset: config.utc_offset,
            anomaly_sigma: config.anomaly_sigma,
            daily_policy: config.daily_policy,
        }
    }
}

// ── Per-tank result ───────────────────────────────────────────────────────────

/// Everything computed for one tank.
#[derive(Debug, Clone)]
pub struct TankAnalysis {
    pub tank_id: String,
    pub capacity: f64,
    pub series: TankSeries,
    pub summary: SummaryStats,
    pub daily: DailyBuckets,
    pub hourly: HourlyBuckets,
    pub weekly: WeeklyBuckets,
    pub anomalies: Vec<DerivedReading>,
    /// `None` when the rate spread was undefined or zero.
    pub threshold: Option<AnomalyThreshold>,
}

impl TankAnalysis {
    /// `true` when no valid readings survived cleaning.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// The result of one tank: its analysis or the reason it failed.
#[derive(Debug)]
pub struct TankOutcome {
    pub tank_id: String,
    pub result: Result<TankAnalysis>,
}

impl TankOutcome {
    pub fn new(tank_id: impl Into<String>, result: Result<TankAnalysis>) -> Self {
        Self {
            tank_id: tank_id.into(),
            result,
        }
    }
}

/// Run metrics, aggregation and anomaly detection over normalised readings.
///
/// An empty input is degenerate but valid: the result carries an empty
/// series, zero-valued buckets and `SummaryStats::empty()`.
pub fn analyze_readings(
    tank_id: &str,
    capacity: f64,
    readings: Vec<Reading>,
    options: &AnalysisOptions,
) -> TankAnalysis {
    if readings.is_empty() {
        warn!("{}", TankError::EmptyData(tank_id.to_string()));
    }

    let series = MetricEngine::build_series(tank_id, readings);
    let summary = MetricEngine::new(options.daily_policy).summarize(&series);
    let daily = SeriesAggregator::daily(series.readings());
    let hourly = SeriesAggregator::hourly(series.readings());
    let weekly = SeriesAggregator::weekly(series.readings());

    let detector = AnomalyDetector::new(options.anomaly_sigma);
    let threshold = detector.threshold(&series);
    let anomalies = detector.detect(&series);

    debug!(
        "tank {}: {} readings, {} days, {} anomalies",
        tank_id,
        series.len(),
        daily.len(),
        anomalies.len()
    );

    TankAnalysis {
        tank_id: tank_id.to_string(),
        capacity,
        series,
        summary,
        daily,
        hourly,
        weekly,
        anomalies,
        threshold,
    }
}

/// Normalise `table` and analyse it.
pub fn analyze_table(
    tank_id: &str,
    capacity: f64,
    table: &RawTable,
    options: &AnalysisOptions,
) -> Result<TankAnalysis> {
    let readings = Normalizer::new(capacity, options.utc_offset).normalize(table)?;
    Ok(analyze_readings(tank_id, capacity, readings, options))
}

/// Read `source` through `reader` and analyse it.
pub fn analyze_source(
    source: &TankSource,
    reader: &dyn FeedReader,
    options: &AnalysisOptions,
) -> Result<TankAnalysis> {
    let table = reader.read(&source.location)?;
    analyze_table(&source.id, source.capacity, &table, options)
}

// ── Batch result ──────────────────────────────────────────────────────────────

/// Metadata produced alongside a batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    pub tanks_requested: usize,
    pub tanks_analyzed: usize,
    pub tanks_failed: usize,
    /// Total readings across all analysed tanks.
    pub readings_processed: usize,
    /// Wall-clock seconds spent on the whole batch.
    pub elapsed_seconds: f64,
}

/// Per-tank outcomes in input order plus the cross-tank comparison.
#[derive(Debug)]
pub struct BatchResult {
    pub outcomes: Vec<TankOutcome>,
    pub comparison: ComparisonTable,
    pub metadata: BatchMetadata,
}

impl BatchResult {
    /// Combine finished outcomes. Must only be called once every tank of
    /// the batch has completed.
    pub fn from_outcomes(outcomes: Vec<TankOutcome>, elapsed_seconds: f64) -> Self {
        let comparison = combine(
            outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .map(|a| &a.series),
        );

        let tanks_failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        let metadata = BatchMetadata {
            generated_at: Utc::now().to_rfc3339(),
            tanks_requested: outcomes.len(),
            tanks_analyzed: outcomes.len() - tanks_failed,
            tanks_failed,
            readings_processed: comparison.len(),
            elapsed_seconds,
        };

        Self {
            outcomes,
            comparison,
            metadata,
        }
    }

    /// Successfully analysed tanks, in input order.
    pub fn successes(&self) -> impl Iterator<Item = &TankAnalysis> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Failed tanks and their errors, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TankError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.tank_id.as_str(), e)))
    }
}

/// Analyse every source one at a time, in input order.
pub fn analyze_all_sources(
    sources: &[TankSource],
    reader: &dyn FeedReader,
    options: &AnalysisOptions,
) -> BatchResult {
    let start = Instant::now();
    let outcomes = sources
        .iter()
        .map(|source| {
            let result = analyze_source(source, reader, options);
            match &result {
                Ok(a) => info!("tank {}: analysed {} readings", source.id, a.series.len()),
                Err(e) => warn!("tank {} failed: {}", source.id, e),
            }
            TankOutcome::new(&source.id, result)
        })
        .collect();
    BatchResult::from_outcomes(outcomes, start.elapsed().as_secs_f64())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{parse_csv, CsvFeedReader};
    use std::collections::HashMap;
    use tank_core::models::{SourceLocation, TankStatus};
    use tempfile::TempDir;

    /// Serves fixed CSV text per URL.
    struct MemoryReader {
        feeds: HashMap<String, String>,
    }

    impl MemoryReader {
        fn new(feeds: &[(&str, &str)]) -> Self {
            Self {
                feeds: feeds
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    impl FeedReader for MemoryReader {
        fn read(&self, location: &SourceLocation) -> Result<RawTable> {
            let key = location.to_string();
            match self.feeds.get(&key) {
                Some(text) => parse_csv(text, &key),
                None => Err(TankError::fetch(key, "HTTP 404 Not Found")),
            }
        }
    }

    fn url_source(id: &str, url: &str) -> TankSource {
        TankSource {
            id: id.to_string(),
            location: SourceLocation::Url(url.to_string()),
            capacity: 10_000.0,
        }
    }

    const THREE_POINT: &str = "created_at,entry_id,field1\n\
        2024-01-15 02:30:00 UTC,1,50\n\
        2024-01-15 03:30:00 UTC,2,80\n\
        2024-01-15 04:30:00 UTC,3,40\n";

    #[test]
    fn test_analyze_table_three_point_scenario() {
        let table = parse_csv(THREE_POINT, "mem").unwrap();
        let a = analyze_table("t1", 10_000.0, &table, &AnalysisOptions::default()).unwrap();

        let volumes: Vec<f64> = a.series.readings().iter().map(|r| r.volume_liters()).collect();
        assert_eq!(volumes, vec![5_000.0, 8_000.0, 4_000.0]);
        let statuses: Vec<Option<TankStatus>> =
            a.series.readings().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![None, Some(TankStatus::Filling), Some(TankStatus::Draining)]
        );
        assert_eq!(a.daily.len(), 1);
        assert_eq!(a.daily.total(), -1_000.0);
        assert_eq!(a.summary.average_daily_consumption, 0.0);
        // 03:30 UTC is 09:00 local.
        assert_eq!(a.summary.peak_usage_hour, Some(9));
        assert!(a.anomalies.is_empty());
    }

    #[test]
    fn test_analyze_table_schema_error() {
        let table = parse_csv("timestamp,field1\n2024-01-15,1\n", "mem").unwrap();
        let err = analyze_table("t", 10_000.0, &table, &AnalysisOptions::default()).unwrap_err();
        match err {
            TankError::Schema { missing, found } => {
                assert_eq!(missing, vec!["created_at".to_string()]);
                assert_eq!(found, vec!["timestamp".to_string(), "field1".to_string()]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_analyze_readings_empty_is_degenerate_not_error() {
        let table = parse_csv("created_at,field1\nbad,1\n", "mem").unwrap();
        let a = analyze_table("t", 10_000.0, &table, &AnalysisOptions::default()).unwrap();
        assert!(a.is_empty());
        assert_eq!(a.summary, SummaryStats::empty());
        assert!(a.daily.is_empty());
        assert!(a.hourly.is_empty());
        assert!(a.weekly.is_empty());
        assert!(a.anomalies.is_empty());
        assert!(a.threshold.is_none());
    }

    #[test]
    fn test_single_reading_tank() {
        let table = parse_csv("created_at,field1\n2024-01-15T08:00:00Z,50\n", "mem").unwrap();
        let a = analyze_table("t", 10_000.0, &table, &AnalysisOptions::default()).unwrap();
        assert_eq!(a.series.len(), 1);
        assert_eq!(a.summary.peak_usage_hour, None);
        assert_eq!(a.summary.average_refill_time, None);
        assert!(a.anomalies.is_empty());
        assert!(a.hourly.is_empty());
        assert_eq!(a.weekly.len(), 1);
        assert_eq!(a.weekly.total(), 0.0);
    }

    #[test]
    fn test_options_respect_policy() {
        let table = parse_csv(THREE_POINT, "mem").unwrap();
        let options = AnalysisOptions {
            daily_policy: DailyAveragePolicy::AllDays,
            ..AnalysisOptions::default()
        };
        let a = analyze_table("t", 10_000.0, &table, &options).unwrap();
        assert_eq!(a.summary.average_daily_consumption, -1_000.0);
    }

    #[test]
    fn test_batch_isolates_failures_and_keeps_order() {
        let reader = MemoryReader::new(&[
            ("https://feed/a.csv", THREE_POINT),
            ("https://feed/c.csv", "created_at,field1\n2024-01-15T08:00:00Z,10\n"),
            ("https://feed/d.csv", "ts,level\n1,2\n"),
        ]);
        let sources = vec![
            url_source("a", "https://feed/a.csv"),
            url_source("b", "https://feed/b.csv"),
            url_source("c", "https://feed/c.csv"),
            url_source("d", "https://feed/d.csv"),
        ];
        let batch = analyze_all_sources(&sources, &reader, &AnalysisOptions::default());

        let ids: Vec<&str> = batch.outcomes.iter().map(|o| o.tank_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let failures: Vec<&str> = batch.failures().map(|(id, _)| id).collect();
        assert_eq!(failures, vec!["b", "d"]);
        assert!(matches!(
            batch.outcomes[1].result,
            Err(TankError::Fetch { .. })
        ));
        assert!(matches!(
            batch.outcomes[3].result,
            Err(TankError::Schema { .. })
        ));

        assert_eq!(batch.comparison.len(), 4);
        let tags: Vec<&str> = batch
            .comparison
            .rows()
            .iter()
            .map(|r| r.tank_id.as_str())
            .collect();
        assert_eq!(tags, vec!["a", "a", "a", "c"]);

        assert_eq!(batch.metadata.tanks_requested, 4);
        assert_eq!(batch.metadata.tanks_analyzed, 2);
        assert_eq!(batch.metadata.tanks_failed, 2);
        assert_eq!(batch.metadata.readings_processed, 4);
    }

    #[test]
    fn test_anomaly_thresholds_are_per_tank() {
        // Tank "calm" alone would flag its single jump; mixing in "busy"
        // must not change that.
        let calm = "created_at,field1\n\
            2024-01-15T00:00:00Z,50.0\n2024-01-15T01:00:00Z,49.9\n\
            2024-01-15T02:00:00Z,49.8\n2024-01-15T03:00:00Z,49.7\n\
            2024-01-15T04:00:00Z,49.6\n2024-01-15T05:00:00Z,49.5\n\
            2024-01-15T06:00:00Z,49.4\n2024-01-15T07:00:00Z,49.3\n\
            2024-01-15T08:00:00Z,49.2\n2024-01-15T09:00:00Z,80.0\n";
        let busy = "created_at,field1\n\
            2024-01-15T00:00:00Z,10\n2024-01-15T01:00:00Z,90\n\
            2024-01-15T02:00:00Z,5\n2024-01-15T03:00:00Z,95\n";
        let reader = MemoryReader::new(&[("u:calm", calm), ("u:busy", busy)]);
        let options = AnalysisOptions::default();

        let alone = analyze_all_sources(&[url_source("calm", "u:calm")], &reader, &options);
        let mixed = analyze_all_sources(
            &[url_source("busy", "u:busy"), url_source("calm", "u:calm")],
            &reader,
            &options,
        );
        let calm_alone = alone.successes().next().unwrap();
        let calm_mixed = mixed.successes().find(|a| a.tank_id == "calm").unwrap();
        assert_eq!(calm_alone.anomalies.len(), 1);
        assert_eq!(calm_alone.anomalies, calm_mixed.anomalies);
        assert_eq!(calm_alone.threshold, calm_mixed.threshold);
    }

    #[test]
    fn test_analyze_source_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("roof.csv");
        std::fs::write(&path, THREE_POINT).unwrap();
        let source = TankSource {
            id: "roof".to_string(),
            location: SourceLocation::File(path),
            capacity: 2_000.0,
        };
        let a = analyze_source(&source, &CsvFeedReader::default(), &AnalysisOptions::default())
            .unwrap();
        assert_eq!(a.capacity, 2_000.0);
        assert_eq!(a.series.readings()[1].volume_liters(), 1_600.0);
    }
}
