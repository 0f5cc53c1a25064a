//! Locale-invariant rendering of metric values.
//!
//! Rust's float formatting never consults the host locale, so everything here
//! renders with `.` as decimal separator and no digit grouping.

use chrono::{DateTime, TimeZone};

pub const UNAVAILABLE: &str = "unavailable";
pub const UNKNOWN: &str = "unknown";

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Two-decimal rounding, shortest representation: `10`, `55.5`, `42.57`.
pub fn format_value(value: f64) -> String {
    let rounded = round2(value);
    // Avoid printing "-0" for tiny negative readings.
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}

/// Converts free bytes to the figure shown in the drive entries:
/// `((bytes / 1024) / 1024) / 1000`, rounded to two decimals. This is neither
/// GB nor GiB; the divisor chain is kept so the output stays comparable with
/// earlier reports.
pub fn bytes_to_display_gb(bytes: u64) -> f64 {
    round2(((bytes as f64 / 1024.0) / 1024.0) / 1000.0)
}

pub fn format_timestamp<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_format_value_rounds_to_two_decimals() {
        assert_eq!(format_value(42.567), "42.57");
        assert_eq!(format_value(42.564), "42.56");
        assert_eq!(format_value(99.999), "100");
    }

    #[test]
    fn test_format_value_uses_shortest_form() {
        assert_eq!(format_value(10.0), "10");
        assert_eq!(format_value(55.5), "55.5");
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(-0.001), "0");
    }

    #[test]
    fn test_format_value_never_groups_digits() {
        assert_eq!(format_value(27085.35), "27085.35");
        assert_eq!(format_value(1234567.0), "1234567");
    }

    #[test]
    fn test_bytes_to_display_gb_divisor_chain() {
        assert_eq!(bytes_to_display_gb(2_000_000_000_000), 1907.35);
        assert_eq!(bytes_to_display_gb(1024 * 1024 * 1000), 1.0);
        assert_eq!(bytes_to_display_gb(0), 0.0);
    }

    #[test]
    fn test_format_timestamp() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&utc), "2024-03-09 07:05:01");

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_timestamp(&utc.with_timezone(&offset)), "2024-03-09 09:05:01");
    }
}
