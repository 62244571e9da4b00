//! Repository utilities.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::result::DatabaseErrorInformation;

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Parse a stored RFC 3339 timestamp, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse a stored `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Format a date the way it is stored.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_storage_format() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(format_date(date), "2024-06-01");
        assert_eq!(parse_date("2024-06-01"), Some(date));
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn test_parse_datetime_falls_back_to_epoch() {
        assert_eq!(parse_datetime("nope"), DateTime::UNIX_EPOCH);
        let ts = parse_datetime("2024-06-01T12:00:00+00:00");
        assert_eq!(ts.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_to_diesel_error_keeps_message() {
        let err = to_diesel_error("disk on fire");
        assert!(err.to_string().contains("disk on fire"));
    }
}
