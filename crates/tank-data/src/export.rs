//! Report files: per-tank CSVs, the comparison CSV and `report.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tank_core::error::{Result, TankError};
use tracing::info;

use crate::report::Report;

pub const REPORT_JSON: &str = "report.json";
pub const COMPARISON_CSV: &str = "comparison.csv";

/// Write every report file into `dir`, creating it if needed.
///
/// Returns the written paths in creation order.
pub fn export_report(report: &Report, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|source| TankError::FileRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();

    for entry in &report.daily {
        let path = dir.join(format!("{}_daily.csv", sanitize_file_stem(&entry.tank)));
        write_csv(&path, &["date", "usage_liters"], &entry.data)?;
        written.push(path);
    }
    for entry in &report.weekly {
        let path = dir.join(format!("{}_weekly.csv", sanitize_file_stem(&entry.tank)));
        write_csv(&path, &["week", "water_diff"], &entry.data)?;
        written.push(path);
    }
    for entry in &report.anomalies {
        let path = dir.join(format!("{}_anomalies.csv", sanitize_file_stem(&entry.tank)));
        write_csv(
            &path,
            &["created_at", "water_liters", "usage_rate"],
            &entry.data,
        )?;
        written.push(path);
    }

    let path = dir.join(COMPARISON_CSV);
    write_csv(&path, &["created_at", "water_liters", "tank"], &report.comparison)?;
    written.push(path);

    let path = dir.join(REPORT_JSON);
    std::fs::write(&path, report.to_json()?)?;
    written.push(path);

    info!("wrote {} report files to {}", written.len(), dir.display());
    Ok(written)
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_stem(tank_id: &str) -> String {
    let stem: String = tank_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "tank".to_string()
    } else {
        stem
    }
}

/// Header is written even when `rows` is empty.
fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
