use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tank_core::error::Result;
use tank_core::models::TankSource;
use tank_core::settings::{unknown_capacity_tank, RunConfig};
use tank_data::reader::discover_tanks;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map `DEBUG|INFO|WARNING|ERROR` onto tracing filter directives.
///
/// Unknown names pass through unchanged so `RUST_LOG`-style directives such
/// as `tank_data=debug` still work.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Logs go to stderr, or are appended to `log_file` when one is given.
/// Falls back to `info` if the level string is not a valid directive.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Source discovery ───────────────────────────────────────────────────────────

/// Configured tanks followed by any `*.csv` found under `--data-dir`.
///
/// Capacity overrides left pending by settings resolution apply to the
/// discovered tanks; one that names no tank at all is an error.
pub fn collect_sources(config: &RunConfig) -> Result<Vec<TankSource>> {
    let mut sources = config.tanks.clone();
    if let Some(dir) = &config.data_dir {
        let mut discovered = discover_tanks(dir, config.tank_capacity, &sources);
        tracing::info!(
            "discovered {} tank feed(s) in {}",
            discovered.len(),
            dir.display()
        );
        for (id, capacity) in &config.pending_capacities {
            match discovered.iter_mut().find(|t| &t.id == id) {
                Some(tank) => tank.capacity = *capacity,
                None => return Err(unknown_capacity_tank(id)),
            }
        }
        sources.extend(discovered);
    }
    Ok(sources)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tank_core::models::SourceLocation;
    use tank_core::settings::Settings;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, extra: &[&str]) -> RunConfig {
        let mut args: Vec<OsString> = vec!["tank-monitor".into()];
        args.extend(extra.iter().map(OsString::from));
        Settings::load_impl(args, &tmp.path().join("absent.json")).unwrap()
    }

    #[test]
    fn test_filter_directive_maps_level_names() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("tank_data=trace"), "tank_data=trace");
    }

    #[test]
    fn test_collect_sources_without_data_dir() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp, &["--tank", "roof=https://feed.invalid/roof.csv"]);
        let sources = collect_sources(&cfg).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources[0].location,
            SourceLocation::Url("https://feed.invalid/roof.csv".into())
        );
    }

    #[test]
    fn test_collect_sources_discovers_csv_files_after_configured() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("sump.csv"), "created_at,field1\n").unwrap();
        std::fs::write(data.join("roof.csv"), "created_at,field1\n").unwrap();
        let roof = data.join("roof.csv");
        let roof_arg = format!("roof={}", roof.display());

        let cfg = config(
            &tmp,
            &[
                "--data-dir",
                data.to_str().unwrap(),
                "--tank",
                &roof_arg,
                "--capacity",
                "roof=500",
            ],
        );
        let sources = collect_sources(&cfg).unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["roof", "sump"]);
        assert_eq!(sources[0].capacity, 500.0);
        assert_eq!(sources[1].capacity, 10_000.0);
    }

    #[test]
    fn test_capacity_override_applies_to_discovered_tank() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("sump.csv"), "created_at,field1\n").unwrap();
        std::fs::write(data.join("well.csv"), "created_at,field1\n").unwrap();

        let cfg = config(
            &tmp,
            &["--data-dir", data.to_str().unwrap(), "--capacity", "sump=500"],
        );
        let sources = collect_sources(&cfg).unwrap();
        let capacities: Vec<(&str, f64)> =
            sources.iter().map(|s| (s.id.as_str(), s.capacity)).collect();
        assert_eq!(capacities, vec![("sump", 500.0), ("well", 10_000.0)]);
    }

    #[test]
    fn test_capacity_override_for_undiscovered_tank_is_error() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("sump.csv"), "created_at,field1\n").unwrap();

        let cfg = config(
            &tmp,
            &["--data-dir", data.to_str().unwrap(), "--capacity", "ghost=500"],
        );
        let err = collect_sources(&cfg).unwrap_err();
        assert!(err.to_string().contains("unknown tank \"ghost\""));
    }
}
