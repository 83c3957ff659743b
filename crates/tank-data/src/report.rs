//! Presentation contract: rounded, windowed, serialisable views of a batch.
//!
//! Internal values keep full precision; rounding to two decimals and the
//! "N/A" sentinels only appear here. The optional date window filters the
//! daily series, the anomaly list and the comparison table. Summaries and
//! the hourly and weekly aggregates always cover the full series.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tank_core::error::TankError;
use tank_core::formatting::{
    format_duration, format_hour, format_liters, round2, NOT_AVAILABLE,
};
use tank_core::models::{DateWindow, DerivedReading, SummaryStats, TankStatus};

use crate::analysis::{BatchMetadata, BatchResult, TankAnalysis};

/// Timestamp format used in every exported table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

// ── Value types ───────────────────────────────────────────────────────────────

/// A rounded number or the `"N/A"` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Value(f64),
    NotAvailable(&'static str),
}

impl Metric {
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) => Metric::Value(round2(v)),
            None => Metric::NotAvailable(NOT_AVAILABLE),
        }
    }
}

/// A payload tagged with the tank it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerTank<T> {
    pub tank: String,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRangeView {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdownView {
    #[serde(rename = "Filling")]
    pub filling: f64,
    #[serde(rename = "Draining")]
    pub draining: f64,
    #[serde(rename = "Idle")]
    pub idle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub date_range: Option<DateRangeView>,
    pub total_readings: usize,
    pub total_volume_used: f64,
    pub average_daily_consumption: f64,
    /// `HH:00` or "N/A".
    pub peak_usage_hour: String,
    pub average_refill_time: Metric,
    pub status_time_breakdown: StatusBreakdownView,
    /// Set when the tank had no valid readings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SummaryView {
    pub fn from_stats(tank_id: &str, stats: &SummaryStats) -> Self {
        let b = &stats.status_time_breakdown;
        let note = (stats.total_readings == 0)
            .then(|| TankError::EmptyData(tank_id.to_string()).to_string());
        Self {
            date_range: stats.date_range.map(|r| DateRangeView {
                start: r.start.to_string(),
                end: r.end.to_string(),
            }),
            total_readings: stats.total_readings,
            total_volume_used: round2(stats.total_volume_used),
            average_daily_consumption: round2(stats.average_daily_consumption),
            peak_usage_hour: format_hour(stats.peak_usage_hour),
            average_refill_time: Metric::from_option(stats.average_refill_time),
            status_time_breakdown: StatusBreakdownView {
                filling: round2(b.get(TankStatus::Filling)),
                draining: round2(b.get(TankStatus::Draining)),
                idle: round2(b.get(TankStatus::Idle)),
            },
            note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub date: String,
    pub usage_liters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRow {
    pub hour: u32,
    pub usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyRow {
    pub week: String,
    pub water_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub created_at: String,
    pub water_liters: f64,
    pub usage_rate: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRowView {
    pub created_at: String,
    pub water_liters: f64,
    pub tank: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureView {
    pub tank: String,
    pub reason: String,
}

// ── Report ────────────────────────────────────────────────────────────────────

/// The full output of one batch, ready for JSON, CSV or console output.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: BatchMetadata,
    pub summaries: Vec<PerTank<SummaryView>>,
    pub daily: Vec<PerTank<Vec<DailyRow>>>,
    pub hourly: Vec<PerTank<Vec<HourlyRow>>>,
    pub weekly: Vec<PerTank<Vec<WeeklyRow>>>,
    pub anomalies: Vec<PerTank<Vec<AnomalyRow>>>,
    pub comparison: Vec<ComparisonRowView>,
    pub failures: Vec<FailureView>,
}

impl Report {
    /// Build the report for `batch`, windowing the dated outputs.
    pub fn build(batch: &BatchResult, window: &DateWindow) -> Self {
        let tanks: Vec<&TankAnalysis> = batch.successes().collect();

        Self {
            metadata: batch.metadata.clone(),
            summaries: tanks
                .iter()
                .map(|a| tagged(a, SummaryView::from_stats(&a.tank_id, &a.summary)))
                .collect(),
            daily: tanks.iter().map(|a| tagged(a, daily_rows(a, window))).collect(),
            hourly: tanks.iter().map(|a| tagged(a, hourly_rows(a))).collect(),
            weekly: tanks.iter().map(|a| tagged(a, weekly_rows(a))).collect(),
            anomalies: tanks
                .iter()
                .map(|a| tagged(a, anomaly_rows(&a.anomalies, window)))
                .collect(),
            comparison: batch
                .comparison
                .rows()
                .iter()
                .filter(|r| window.contains(r.timestamp.date_naive()))
                .map(|r| ComparisonRowView {
                    created_at: format_timestamp(&r.timestamp),
                    water_liters: round2(r.volume_liters),
                    tank: r.tank_id.clone(),
                })
                .collect(),
            failures: batch
                .failures()
                .map(|(tank, err)| FailureView {
                    tank: tank.to_string(),
                    reason: err.to_string(),
                })
                .collect(),
        }
    }

    /// Serialise as pretty-printed JSON.
    pub fn to_json(&self) -> tank_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text console summary: one block per tank, one line per failure.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.summaries {
            let s = &entry.data;
            let _ = writeln!(out, "== {} ==", entry.tank);
            if let Some(note) = &s.note {
                let _ = writeln!(out, "  {}", note);
                continue;
            }
            if let Some(range) = &s.date_range {
                let _ = writeln!(out, "  Date range:         {} to {}", range.start, range.end);
            }
            let _ = writeln!(out, "  Readings:           {}", s.total_readings);
            let _ = writeln!(
                out,
                "  Net volume change:  {} L",
                format_liters(s.total_volume_used)
            );
            let _ = writeln!(
                out,
                "  Avg daily usage:    {} L",
                format_liters(s.average_daily_consumption)
            );
            let _ = writeln!(out, "  Peak usage hour:    {}", s.peak_usage_hour);
            let refill = match s.average_refill_time {
                Metric::Value(v) => format_duration(v),
                Metric::NotAvailable(na) => na.to_string(),
            };
            let _ = writeln!(out, "  Avg refill time:    {}", refill);
            let b = &s.status_time_breakdown;
            let _ = writeln!(
                out,
                "  Filling / Draining / Idle: {} / {} / {}",
                format_duration(b.filling),
                format_duration(b.draining),
                format_duration(b.idle)
            );
            let anomalies = self
                .anomalies
                .iter()
                .find(|a| a.tank == entry.tank)
                .map_or(0, |a| a.data.len());
            let _ = writeln!(out, "  Anomalies:          {}", anomalies);
        }
        for failure in &self.failures {
            let _ = writeln!(out, "!! {}: {}", failure.tank, failure.reason);
        }
        out
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn tagged<T>(analysis: &TankAnalysis, data: T) -> PerTank<T> {
    PerTank {
        tank: analysis.tank_id.clone(),
        data,
    }
}

fn daily_rows(analysis: &TankAnalysis, window: &DateWindow) -> Vec<DailyRow> {
    analysis
        .daily
        .iter()
        .filter(|(date, _)| window.contains(*date))
        .map(|(date, sum)| DailyRow {
            date: date.to_string(),
            usage_liters: round2(sum),
        })
        .collect()
}

fn hourly_rows(analysis: &TankAnalysis) -> Vec<HourlyRow> {
    analysis
        .hourly
        .iter()
        .map(|(hour, rate)| HourlyRow {
            hour,
            usage_rate: round2(rate),
        })
        .collect()
}

fn weekly_rows(analysis: &TankAnalysis) -> Vec<WeeklyRow> {
    analysis
        .weekly
        .iter()
        .map(|(week, diff)| WeeklyRow {
            week: week.label(),
            water_diff: round2(diff),
        })
        .collect()
}

fn anomaly_rows(anomalies: &[DerivedReading], window: &DateWindow) -> Vec<AnomalyRow> {
    anomalies
        .iter()
        .filter(|r| window.contains(r.reading.date()))
        .map(|r| AnomalyRow {
            created_at: format_timestamp(&r.timestamp()),
            water_liters: round2(r.volume_liters()),
            usage_rate: Metric::from_option(r.usage_rate),
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
