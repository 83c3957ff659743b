use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use tracing::debug;

use crate::error::{Result, TankError};

/// Offset applied to feed timestamps unless configured otherwise (+05:30).
pub const DEFAULT_UTC_OFFSET: &str = "+05:30";

const DEFAULT_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// The default +05:30 offset.
pub fn default_offset() -> FixedOffset {
    // 19800 s is always within the ±24 h range accepted by `east_opt`.
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

// ── Timestamp parsing ─────────────────────────────────────────────────────────

/// Parse a feed timestamp into an absolute UTC instant.
///
/// Accepts RFC 3339 (with `Z` or an explicit offset), the ThingSpeak
/// `YYYY-MM-DD HH:MM:SS UTC` form, naive ISO date-times (read as UTC) and
/// bare dates (midnight UTC). Returns `None` for anything else so callers can
/// treat the value as missing.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let normalised = if let Some(stripped) = s.strip_suffix('Z') {
        format!("{}+00:00", stripped)
    } else {
        s.to_string()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.with_timezone(&Utc));
    }

    // "2024-01-15 08:00:00 UTC" and "2024-01-15 08:00:00+05:30".
    let without_utc = s.strip_suffix(" UTC").unwrap_or(s);
    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(without_utc, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_utc, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(without_utc, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&naive));
    }

    debug!("could not parse timestamp \"{}\"", s);
    None
}

/// Re-express a UTC instant in the local offset.
///
/// The instant is unchanged; calendar date and hour are read from the
/// shifted wall clock.
pub fn apply_offset(dt: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    dt.with_timezone(&offset)
}

// ── Offset parsing ────────────────────────────────────────────────────────────

/// Parse a `±HH:MM` (or `±HHMM`, or `Z`) offset string.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let invalid = || TankError::Config(format!("invalid UTC offset \"{}\"", raw));

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_rfc3339_z_suffix() {
        assert_eq!(
            parse_timestamp("2024-01-15T08:00:00Z"),
            Some(utc("2024-01-15T08:00:00+00:00"))
        );
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        assert_eq!(
            parse_timestamp("2024-01-15T13:30:00+05:30"),
            Some(utc("2024-01-15T08:00:00Z"))
        );
    }

    #[test]
    fn test_parse_thingspeak_utc_suffix() {
        assert_eq!(
            parse_timestamp("2024-01-15 08:00:00 UTC"),
            Some(utc("2024-01-15T08:00:00Z"))
        );
    }

    #[test]
    fn test_parse_naive_is_utc() {
        assert_eq!(
            parse_timestamp(" 2024-01-15 08:00:00 "),
            Some(utc("2024-01-15T08:00:00Z"))
        );
        assert_eq!(
            parse_timestamp("2024-01-15T08:00:00.250"),
            Some(utc("2024-01-15T08:00:00.250Z"))
        );
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(
            parse_timestamp("2024-01-15"),
            Some(utc("2024-01-15T00:00:00Z"))
        );
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-45 99:00:00"), None);
    }

    #[test]
    fn test_apply_offset_shifts_wall_clock() {
        let local = apply_offset(utc("2024-01-15T20:00:00Z"), default_offset());
        assert_eq!(local.hour(), 1);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
        assert_eq!(local.with_timezone(&Utc), utc("2024-01-15T20:00:00Z"));
    }

    #[test]
    fn test_parse_utc_offset_forms() {
        assert_eq!(parse_utc_offset("+05:30").unwrap(), default_offset());
        assert_eq!(parse_utc_offset("+0530").unwrap(), default_offset());
        assert_eq!(
            parse_utc_offset("-04:00").unwrap().local_minus_utc(),
            -4 * 3600
        );
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_utc_offset_rejects_invalid() {
        assert!(parse_utc_offset("05:30").is_err());
        assert!(parse_utc_offset("+5:3").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("Asia/Kolkata").is_err());
    }

    #[test]
    fn test_default_offset_matches_constant() {
        assert_eq!(parse_utc_offset(DEFAULT_UTC_OFFSET).unwrap(), default_offset());
    }
}
