//! Batch orchestrator.
//!
//! Fans every tank out to the tokio blocking pool, bounds each one with a
//! deadline, then waits for all of them in input order before combining.
//! No tank can see another tank's state; the only shared value is the
//! read-only feed reader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tank_core::error::{Result, TankError};
use tank_core::models::TankSource;
use tank_core::settings::RunConfig;
use tank_data::analysis::{
    analyze_source, AnalysisOptions, BatchResult, TankAnalysis, TankOutcome,
};
use tank_data::reader::{CsvFeedReader, FeedReader};
use tokio::task::JoinHandle;

use crate::loader::SourceLoader;

/// Slack added to the per-tank deadline on top of the fetch budget.
const PROCESSING_SLACK: Duration = Duration::from_secs(5);

/// Runs the per-tank pipeline for a whole batch.
pub struct BatchOrchestrator {
    reader: Arc<dyn FeedReader>,
    options: AnalysisOptions,
    tank_timeout: Duration,
    sequential: bool,
}

impl BatchOrchestrator {
    pub fn new(
        reader: Arc<dyn FeedReader>,
        options: AnalysisOptions,
        tank_timeout: Duration,
        sequential: bool,
    ) -> Self {
        Self {
            reader,
            options,
            tank_timeout,
            sequential,
        }
    }

    /// Build the production orchestrator: HTTP/file reader with retries and
    /// a deadline covering every attempt.
    pub fn from_run_config(config: &RunConfig) -> Self {
        let attempts = config.retries.max(1);
        let http = Arc::new(CsvFeedReader::new(config.fetch_timeout));
        let reader = SourceLoader::new(http, attempts);
        Self::new(
            Arc::new(reader),
            AnalysisOptions::from_run_config(config),
            tank_deadline(config.fetch_timeout, attempts),
            config.sequential,
        )
    }

    pub fn tank_timeout(&self) -> Duration {
        self.tank_timeout
    }

    /// Analyse every source and combine the results.
    ///
    /// Outcomes keep the order of `sources` whether tanks ran concurrently
    /// or one after another.
    pub async fn run(&self, sources: Vec<TankSource>) -> BatchResult {
        let start = Instant::now();
        tracing::info!(
            tanks = sources.len(),
            sequential = self.sequential,
            "starting batch analysis"
        );

        let mut outcomes = Vec::with_capacity(sources.len());
        if self.sequential {
            for source in sources {
                let id = source.id.clone();
                let result = self.spawn_tank(source).await;
                outcomes.push(Self::finish(id, result));
            }
        } else {
            let handles: Vec<(String, JoinHandle<Result<TankAnalysis>>)> = sources
                .into_iter()
                .map(|source| (source.id.clone(), tokio::spawn(self.spawn_tank(source))))
                .collect();

            // Join barrier: the combiner only sees complete results.
            for (id, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(TankError::Other(anyhow::anyhow!(
                        "analysis task for tank {} failed: {}",
                        id,
                        e
                    )))
                });
                outcomes.push(Self::finish(id, result));
            }
        }

        let batch = BatchResult::from_outcomes(outcomes, start.elapsed().as_secs_f64());
        tracing::info!(
            analysed = batch.metadata.tanks_analyzed,
            failed = batch.metadata.tanks_failed,
            elapsed = batch.metadata.elapsed_seconds,
            "batch analysis complete"
        );
        batch
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Future running one tank on the blocking pool under the deadline.
    fn spawn_tank(
        &self,
        source: TankSource,
    ) -> impl std::future::Future<Output = Result<TankAnalysis>> + Send + 'static {
        let reader = Arc::clone(&self.reader);
        let options = self.options;
        let deadline = self.tank_timeout;

        async move {
            let location = source.location.to_string();
            let task = tokio::task::spawn_blocking(move || {
                analyze_source(&source, reader.as_ref(), &options)
            });

            match tokio::time::timeout(deadline, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(TankError::Other(anyhow::anyhow!(
                    "analysis of {} aborted: {}",
                    location,
                    join_err
                ))),
                // The blocking read keeps running; its result is discarded.
                Err(_) => Err(TankError::fetch(
                    location,
                    format!("timed out after {}s", deadline.as_secs_f64()),
                )),
            }
        }
    }

    fn finish(tank_id: String, result: Result<TankAnalysis>) -> TankOutcome {
        match &result {
            Ok(a) if a.is_empty() => tracing::warn!(tank = %tank_id, "no valid readings"),
            Ok(a) => tracing::info!(tank = %tank_id, readings = a.series.len(), "tank analysed"),
            Err(e) => tracing::warn!(tank = %tank_id, error = %e, "tank failed"),
        }
        TankOutcome::new(tank_id, result)
    }
}

/// Deadline for one tank: every fetch attempt, the back-off between them and
/// a fixed processing slack.
pub fn tank_deadline(fetch_timeout: Duration, attempts: u32) -> Duration {
    let attempts = attempts.max(1);
    let backoff_ms: u64 = (0..u64::from(attempts)).map(|a| a * 100).sum();
    fetch_timeout * attempts + Duration::from_millis(backoff_ms) + PROCESSING_SLACK
}

// ── Tests ─────────────────────────────────────────────────────────────────────
