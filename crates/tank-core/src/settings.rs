use chrono::{FixedOffset, NaiveDate};
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TankError};
use crate::models::{
    DailyAveragePolicy, DateWindow, SourceLocation, TankSource, DEFAULT_TANK_CAPACITY,
};
use crate::time_utils::{parse_utc_offset, DEFAULT_UTC_OFFSET};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Batch analytics for water-tank level telemetry
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tank-monitor",
    about = "Batch analytics for water-tank level telemetry",
    version
)]
pub struct Settings {
    /// JSON configuration file (defaults to ~/.tank-monitor/config.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tank feed as NAME=SOURCE (repeatable)
    #[arg(long = "tank", value_name = "NAME=SOURCE")]
    pub tanks: Vec<String>,

    /// Per-tank capacity override as NAME=LITRES (repeatable)
    #[arg(long = "capacity", value_name = "NAME=LITRES")]
    pub capacities: Vec<String>,

    /// Directory scanned for <tank>.csv files (implies --from-csv)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Treat sources as local CSV files instead of URLs
    #[arg(long)]
    pub from_csv: bool,

    /// Default tank capacity in litres
    #[arg(long, default_value_t = DEFAULT_TANK_CAPACITY)]
    pub tank_capacity: f64,

    /// Offset applied to feed timestamps
    #[arg(long, default_value = DEFAULT_UTC_OFFSET, allow_hyphen_values = true)]
    pub utc_offset: String,

    /// Anomaly threshold in standard deviations above the mean rate
    #[arg(long, default_value = "2.0")]
    pub anomaly_sigma: f64,

    /// Days included in the average daily consumption
    #[arg(long, default_value = "positive", value_parser = ["positive", "all"])]
    pub daily_average: String,

    /// First date (YYYY-MM-DD) shown in daily, anomaly and comparison output
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Last date (YYYY-MM-DD) shown in daily, anomaly and comparison output
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Per-tank fetch timeout in seconds (1-300)
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..=300))]
    pub fetch_timeout: u64,

    /// Fetch attempts per tank (1-10)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retries: u32,

    /// Process tanks one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Directory for CSV and JSON report export
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── FileConfig ─────────────────────────────────────────────────────────────────

/// One tank entry of the JSON configuration file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TankEntry {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
}

/// Contents of the JSON configuration file.
///
/// Every global field is optional; anything absent falls back to the CLI
/// value (explicit or default).
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_csv: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tank_capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_sigma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_average: Option<DailyAveragePolicy>,
    #[serde(default)]
    pub tanks: Vec<TankEntry>,
}

impl FileConfig {
    /// Default config location, `~/.tank-monitor/config.json`.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir` (used for testing).
    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".tank-monitor").join("config.json")
    }

    /// Load and parse a config file. Unlike the default-path lookup, a
    /// missing or malformed file is an error here.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TankError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ── RunConfig ──────────────────────────────────────────────────────────────────

/// Fully resolved, validated configuration for one batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub tanks: Vec<TankSource>,
    /// `--capacity` overrides naming no configured tank, left for tanks
    /// discovered under `data_dir`.
    pub pending_capacities: Vec<(String, f64)>,
    pub from_csv: bool,
    pub data_dir: Option<PathBuf>,
    pub tank_capacity: f64,
    pub utc_offset: FixedOffset,
    pub anomaly_sigma: f64,
    pub daily_policy: DailyAveragePolicy,
    pub window: DateWindow,
    pub fetch_timeout: Duration,
    pub retries: u32,
    pub sequential: bool,
    pub output_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and resolve them against the config file.
    pub fn load() -> Result<RunConfig> {
        Self::load_impl(std::env::args_os().collect(), &FileConfig::default_path())
    }

    /// Full implementation; accepts args and the default config path so
    /// tests can redirect to a temporary directory.
    pub fn load_impl(args: Vec<std::ffi::OsString>, default_config: &Path) -> Result<RunConfig> {
        let matches = Settings::command().get_matches_from(args.clone());
        let settings = Settings::parse_from(args);

        let file = match &settings.config {
            Some(path) => FileConfig::load_from(path)?,
            None if default_config.exists() => {
                debug!("using config file {}", default_config.display());
                FileConfig::load_from(default_config)?
            }
            None => FileConfig::default(),
        };

        settings.resolve(&file, &matches)
    }

    /// Merge CLI values with `file`. Values given explicitly on the command
    /// line win; file values win over CLI defaults.
    pub fn resolve(&self, file: &FileConfig, matches: &clap::ArgMatches) -> Result<RunConfig> {
        let explicit = |name: &str| is_arg_explicitly_set(matches, name);

        let from_csv = if self.from_csv || self.data_dir.is_some() {
            true
        } else {
            file.from_csv.unwrap_or(false)
        };

        let tank_capacity = match file.tank_capacity {
            Some(v) if !explicit("tank_capacity") => v,
            _ => self.tank_capacity,
        };
        validate_capacity("tank_capacity", tank_capacity)?;

        let offset_str = match &file.utc_offset {
            Some(v) if !explicit("utc_offset") => v.as_str(),
            _ => self.utc_offset.as_str(),
        };
        let utc_offset = parse_utc_offset(offset_str)?;

        let anomaly_sigma = match file.anomaly_sigma {
            Some(v) if !explicit("anomaly_sigma") => v,
            _ => self.anomaly_sigma,
        };
        if !anomaly_sigma.is_finite() || anomaly_sigma < 0.0 {
            return Err(TankError::Config(format!(
                "anomaly_sigma must be a non-negative number, got {}",
                anomaly_sigma
            )));
        }

        let daily_policy = match file.daily_average {
            Some(p) if !explicit("daily_average") => p,
            _ => self
                .daily_average
                .parse::<DailyAveragePolicy>()
                .map_err(TankError::Config)?,
        };

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(TankError::Config(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }

        let (tanks, pending_capacities) = self.resolve_tanks(file, from_csv, tank_capacity)?;

        let log_level = if self.debug {
            "DEBUG".to_string()
        } else {
            self.log_level.clone()
        };

        Ok(RunConfig {
            tanks,
            pending_capacities,
            from_csv,
            data_dir: self.data_dir.clone(),
            tank_capacity,
            utc_offset,
            anomaly_sigma,
            daily_policy,
            window: DateWindow::new(self.start_date, self.end_date),
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            retries: self.retries,
            sequential: self.sequential,
            output_dir: self.output_dir.clone(),
            log_level,
            log_file: self.log_file.clone(),
        })
    }

    /// Build the tank list: file entries first, then `--tank` entries (a CLI
    /// entry replaces a file entry with the same id in place), then apply
    /// `--capacity` overrides.
    ///
    /// With `--data-dir` set, overrides for ids not configured here are
    /// returned for the discovered tanks; without it they are an error.
    fn resolve_tanks(
        &self,
        file: &FileConfig,
        from_csv: bool,
        default_capacity: f64,
    ) -> Result<(Vec<TankSource>, Vec<(String, f64)>)> {
        let mut tanks: Vec<TankSource> = Vec::new();

        for entry in &file.tanks {
            let capacity = entry.capacity.unwrap_or(default_capacity);
            validate_capacity(&entry.id, capacity)?;
            if tanks.iter().any(|t| t.id == entry.id) {
                return Err(TankError::Config(format!(
                    "duplicate tank id \"{}\" in config file",
                    entry.id
                )));
            }
            tanks.push(TankSource {
                id: entry.id.clone(),
                location: SourceLocation::from_mode(&entry.source, from_csv),
                capacity,
            });
        }

        for pair in &self.tanks {
            let (id, source) = split_pair(pair, "--tank")?;
            let tank = TankSource {
                id: id.to_string(),
                location: SourceLocation::from_mode(source, from_csv),
                capacity: default_capacity,
            };
            match tanks.iter_mut().find(|t| t.id == tank.id) {
                Some(existing) => {
                    existing.location = tank.location;
                }
                None => tanks.push(tank),
            }
        }

        let mut pending = Vec::new();
        for pair in &self.capacities {
            let (id, value) = split_pair(pair, "--capacity")?;
            let capacity: f64 = value.parse().map_err(|_| {
                TankError::Config(format!("invalid capacity \"{}\" for tank {}", value, id))
            })?;
            validate_capacity(id, capacity)?;
            match tanks.iter_mut().find(|t| t.id == id) {
                Some(tank) => tank.capacity = capacity,
                None if self.data_dir.is_some() => {
                    pending.retain(|(known, _): &(String, f64)| known != id);
                    pending.push((id.to_string(), capacity));
                }
                None => return Err(unknown_capacity_tank(id)),
            }
        }

        Ok((tanks, pending))
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

/// Split `NAME=VALUE` on the first `=`.
fn split_pair<'a>(pair: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim(), value.trim()))
        }
        _ => Err(TankError::Config(format!(
            "{} expects NAME=VALUE, got \"{}\"",
            flag, pair
        ))),
    }
}

/// Error for a `--capacity` override that matches no tank.
pub fn unknown_capacity_tank(id: &str) -> TankError {
    TankError::Config(format!("--capacity given for unknown tank \"{}\"", id))
}

fn validate_capacity(label: &str, capacity: f64) -> Result<()> {
    if capacity.is_finite() && capacity > 0.0 {
        Ok(())
    } else {
        Err(TankError::Config(format!(
            "capacity for {} must be a positive number, got {}",
            label, capacity
        )))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
