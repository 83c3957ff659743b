/// Placeholder shown for values that are undefined for a tank.
pub const NOT_AVAILABLE: &str = "N/A";

/// Round to two decimal places for presentation.
///
/// # Examples
///
/// ```
/// use tank_core::formatting::round2;
///
/// assert_eq!(round2(1234.5678), 1234.57);
/// assert_eq!(round2(-0.004), -0.0);
/// ```
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a value with thousands separators and two decimals.
///
/// # Examples
///
/// ```
/// use tank_core::formatting::format_liters;
///
/// assert_eq!(format_liters(1234567.891), "1,234,567.89");
/// assert_eq!(format_liters(-4000.0), "-4,000.00");
/// assert_eq!(format_liters(0.0), "0.00");
/// ```
pub fn format_liters(value: f64) -> String {
    let rounded = round2(value);
    let negative = rounded < 0.0;
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let grouped = group_thousands(int_part);
    if negative {
        format!("-{}.{}", grouped, frac_part)
    } else {
        format!("{}.{}", grouped, frac_part)
    }
}

/// Format an hour of day as `HH:00`, or `"N/A"`.
pub fn format_hour(hour: Option<u32>) -> String {
    match hour {
        Some(h) => format!("{:02}:00", h),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Format a duration in seconds as `"1h 05m 30s"`, `"5m 00s"` or `"42s"`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_two_decimals() {
        assert_eq!(round2(2.346), 2.35);
        assert_eq!(round2(-7.001), -7.0);
        assert_eq!(round2(10.0), 10.0);
    }

    #[test]
    fn test_format_liters_grouping() {
        assert_eq!(format_liters(999.0), "999.00");
        assert_eq!(format_liters(1000.0), "1,000.00");
        assert_eq!(format_liters(-1000.5), "-1,000.50");
    }

    #[test]
    fn test_format_hour() {
        assert_eq!(format_hour(Some(7)), "07:00");
        assert_eq!(format_hour(None), "N/A");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.0), "42s");
        assert_eq!(format_duration(300.0), "5m 00s");
        assert_eq!(format_duration(3930.0), "1h 05m 30s");
    }
}
