use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the tank monitor.
#[derive(Error, Debug)]
pub enum TankError {
    /// A required column is absent from the source table.
    #[error("Missing required column(s) [{}]; found [{}]", .missing.join(", "), .found.join(", "))]
    Schema {
        missing: Vec<String>,
        found: Vec<String>,
    },

    /// The feed could not be fetched or read (unreachable URL, unreadable or
    /// malformed file, timeout). `transient` marks failures worth retrying.
    #[error("Failed to fetch {location}: {reason}")]
    Fetch {
        location: String,
        reason: String,
        transient: bool,
    },

    /// No valid rows remained after cleaning.
    #[error("No valid readings for tank {0} after cleaning")]
    EmptyData(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A report CSV could not be written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TankError {
    /// A permanent [`TankError::Fetch`]: missing file, bad content, HTTP 4xx.
    pub fn fetch(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        TankError::Fetch {
            location: location.into(),
            reason: reason.to_string(),
            transient: false,
        }
    }

    /// A [`TankError::Fetch`] that may succeed on retry: network failure,
    /// timeout, HTTP 5xx.
    pub fn fetch_transient(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        TankError::Fetch {
            location: location.into(),
            reason: reason.to_string(),
            transient: true,
        }
    }

    /// Whether retrying the same source could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TankError::Fetch { transient: true, .. })
    }
}

/// Convenience alias used throughout the tank crates.
pub type Result<T> = std::result::Result<T, TankError>;
