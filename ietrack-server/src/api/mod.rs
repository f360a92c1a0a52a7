//! HTTP API handlers for ietrack-server

pub mod dates;
pub mod error;
pub mod filings;
pub mod health;
pub mod listing;
pub mod update;

pub use dates::by_date;
pub use error::AppError;
pub use filings::{daily as daily_filings, details as filing_details};
pub use health::health_routes;
pub use listing::{committee, home, live};
pub use update::trigger_sync;

use chrono::NaiveDate;

/// `YYYY-MM-DD` query value, or `default` when absent or blank
pub fn parse_date(raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::InvalidInput(format!("date {:?} is not YYYY-MM-DD", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let default = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(parse_date(None, default).unwrap(), default);
        assert_eq!(parse_date(Some(" "), default).unwrap(), default);
        assert_eq!(
            parse_date(Some("2024-06-30"), default).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
        );
        assert!(matches!(
            parse_date(Some("06/30/2024"), default),
            Err(AppError::InvalidInput(_))
        ));
    }
}
