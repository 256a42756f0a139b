use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an ISO-8601 timestamp such as `2024-05-01T12:30:00Z` or one
/// carrying an explicit offset. Timestamps without an offset are UTC.
pub fn parse_iso_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date_str, format).ok())
        .map(|naive| naive.and_utc())
}

/// Converts fractional unix seconds (as Reddit reports them) to UTC.
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }

    let whole = seconds.trunc();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = ((seconds - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

pub fn format_local(datetime: Option<DateTime<Utc>>, tz: &Tz) -> String {
    match datetime {
        Some(dt) => dt.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        None => "unknown".to_string(),
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>().map_err(|e| e.to_string())
}
