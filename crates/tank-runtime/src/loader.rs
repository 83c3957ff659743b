//! Feed reading with retry and linear back-off.
//!
//! [`SourceLoader`] wraps any [`FeedReader`] and retries transient failures
//! (unreachable URL, timeout, HTTP 5xx) a bounded number of times. Missing
//! files, HTTP 4xx, malformed content and schema problems are returned at once.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tank_core::error::Result;
use tank_core::models::SourceLocation;
use tank_data::reader::{FeedReader, RawTable};

/// Default number of read attempts per source.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay added per retry (0 ms, 100 ms, 200 ms …).
const BACKOFF_STEP_MS: u64 = 100;

/// A [`FeedReader`] that retries its inner reader.
pub struct SourceLoader {
    inner: Arc<dyn FeedReader>,
    max_attempts: u32,
}

impl SourceLoader {
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(inner: Arc<dyn FeedReader>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Back-off before attempt number `attempt` (0-based).
    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(u64::from(attempt) * BACKOFF_STEP_MS)
    }
}

impl FeedReader for SourceLoader {
    fn read(&self, location: &SourceLocation) -> Result<RawTable> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let sleep = Self::backoff(attempt);
                tracing::debug!(
                    attempt,
                    sleep_ms = sleep.as_millis() as u64,
                    %location,
                    "retrying read after back-off"
                );
                thread::sleep(sleep);
            }

            match self.inner.read(location) {
                Ok(table) => return Ok(table),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    tracing::warn!(attempt, error = %e, "read attempt failed");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
