//! Lenient date and timestamp parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

// Spotify reports release dates at year, month or day precision
static YEAR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());

static YEAR_MONTH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

static ISO_DATE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());

static ISO_DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an album release date.
///
/// Year-only and year-month values resolve to the first day of the period.
/// Full timestamps are truncated to their date.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Some(caps) = YEAR_REGEX.captures(raw) {
        return NaiveDate::from_ymd_opt(caps[1].parse().ok()?, 1, 1);
    }

    if let Some(caps) = YEAR_MONTH_REGEX.captures(raw) {
        return NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 1);
    }

    if let Some(caps) = ISO_DATE_REGEX.captures(raw) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if ISO_DATETIME_REGEX.is_match(raw) {
        return parse_timestamp(raw).map(|ts| ts.date_naive());
    }

    None
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive date-time which is taken as
/// UTC (the extractor writes `datetime.utcnow().isoformat()`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
