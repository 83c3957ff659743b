//! Long-form concatenation of every tank's series.

use tank_core::models::{ComparisonRow, ComparisonTable, TankSeries};

/// Concatenate `series` in iteration order, tagging each row with its tank.
///
/// No resampling or deduplication happens here; each tank keeps its own row
/// order.
pub fn combine<'a>(series: impl IntoIterator<Item = &'a TankSeries>) -> ComparisonTable {
    let rows = series
        .into_iter()
        .flat_map(|s| {
            s.readings().iter().map(move |r| ComparisonRow {
                timestamp: r.timestamp(),
                volume_liters: r.volume_liters(),
                tank_id: s.tank_id().to_string(),
            })
        })
        .collect();
    ComparisonTable::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricEngine;
    use chrono::DateTime;
    use tank_core::models::Reading;

    fn series(id: &str, points: &[(&str, f64)]) -> TankSeries {
        MetricEngine::build_series(
            id,
            points
                .iter()
                .map(|(ts, v)| Reading {
                    timestamp: DateTime::parse_from_rfc3339(ts).unwrap(),
                    raw_signal: *v / 100.0,
                    volume_liters: *v,
                })
                .collect(),
        )
    }

    #[test]
    fn test_combine_concatenates_in_tank_order() {
        let a = series(
            "roof",
            &[
                ("2024-01-15T10:00:00+05:30", 1.0),
                ("2024-01-15T11:00:00+05:30", 2.0),
            ],
        );
        let b = series("sump", &[("2024-01-15T09:00:00+05:30", 3.0)]);

        let table = combine([&a, &b]);
        assert_eq!(table.len(), 3);
        let ids: Vec<&str> = table.rows().iter().map(|r| r.tank_id.as_str()).collect();
        assert_eq!(ids, vec!["roof", "roof", "sump"]);
        let volumes: Vec<f64> = table.rows().iter().map(|r| r.volume_liters).collect();
        assert_eq!(volumes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_combine_row_count_matches_total_readings() {
        let a = series("a", &[("2024-01-15T10:00:00+05:30", 1.0)]);
        let empty = series("empty", &[]);
        let c = series(
            "c",
            &[
                ("2024-01-15T10:00:00+05:30", 5.0),
                ("2024-01-15T10:00:00+05:30", 6.0),
            ],
        );
        let table = combine(vec![&a, &empty, &c]);
        assert_eq!(table.len(), a.len() + empty.len() + c.len());
    }

    #[test]
    fn test_combine_nothing() {
        assert!(combine(Vec::<&TankSeries>::new()).is_empty());
    }
}
