//! Business-date utilities

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Resolve the business date ("today") at the given UTC offset
///
/// An explicit override wins; it lets a deployment pin the date for replays.
pub fn business_today(utc_offset_hours: i32, override_date: Option<NaiveDate>) -> NaiveDate {
    if let Some(date) = override_date {
        return date;
    }
    business_date_at(now(), utc_offset_hours)
}

/// Calendar date of `instant` at a fixed UTC offset (clamped to ±23h)
pub fn business_date_at(instant: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDate {
    let hours = utc_offset_hours.clamp(-23, 23);
    match FixedOffset::east_opt(hours * 3600) {
        Some(offset) => instant.with_timezone(&offset).date_naive(),
        None => instant.date_naive(),
    }
}

/// `YYYY/MM/DD` path segment used by the date-scoped API endpoints
pub fn date_path(date: NaiveDate) -> String {
    format!("{:04}/{:02}/{:02}", date.year(), date.month(), date.day())
}

/// First day of a trailing window of `days` days ending at `today`
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days))
}
