//! Statistical flagging of unusual usage rates.

use serde::{Deserialize, Serialize};
use tank_core::models::{DerivedReading, TankSeries};
use tank_core::stats::{mean, sample_std_dev};

/// Default threshold multiplier (mean + 2σ).
pub const DEFAULT_SIGMA: f64 = 2.0;

/// The per-tank threshold and the statistics it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThreshold {
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
}

/// Flags readings whose |usage_rate| exceeds `mean + sigma × std_dev`.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    sigma: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIGMA)
    }
}

impl AnomalyDetector {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    /// Threshold for `series`, or `None` when the rate spread is undefined
    /// (fewer than two rates) or zero.
    pub fn threshold(&self, series: &TankSeries) -> Option<AnomalyThreshold> {
        let rates: Vec<f64> = series.usage_rates().collect();
        let std_dev = sample_std_dev(&rates)?;
        if std_dev == 0.0 {
            return None;
        }
        let mean = mean(&rates)?;
        Some(AnomalyThreshold {
            mean,
            std_dev,
            threshold: mean + self.sigma * std_dev,
        })
    }

    /// Anomalous readings of `series`, in series order.
    pub fn detect(&self, series: &TankSeries) -> Vec<DerivedReading> {
        let Some(limit) = self.threshold(series) else {
            return Vec::new();
        };
        series
            .readings()
            .iter()
            .filter(|r| r.usage_rate.is_some_and(|rate| rate.abs() > limit.threshold))
            .cloned()
            .collect()
    }
}
