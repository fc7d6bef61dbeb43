use chrono::NaiveDate;

use crate::error::{IdentityError, Result};

pub const ISO_DATE: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date and returns it in canonical form.
pub fn validate_iso_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, ISO_DATE)
        .map(|d| d.format(ISO_DATE).to_string())
        .map_err(|_| IdentityError::InvalidInput(format!("'{raw}' is not a YYYY-MM-DD date")))
}

/// Bucket for records without a date.
pub const UNKNOWN_YEAR: &str = "Unknown";

/// Year part of an ISO date, or [`UNKNOWN_YEAR`].
pub fn year_of(date: Option<&str>) -> &str {
    date.and_then(|d| d.get(..4))
        .filter(|y| y.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(UNKNOWN_YEAR)
}

/// Earliest and latest of a set of ISO dates. Canonical ISO dates order
/// lexicographically, so plain string comparison is enough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn include(&mut self, date: Option<&str>) {
        let Some(date) = date.filter(|d| !d.is_empty()) else {
            return;
        };
        if self.start.as_deref().map_or(true, |s| date < s) {
            self.start = Some(date.to_string());
        }
        if self.end.as_deref().map_or(true, |e| date > e) {
            self.end = Some(date.to_string());
        }
    }
}
