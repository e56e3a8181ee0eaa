use crate::error::{RagError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use time::macros::format_description;
use time::Date;

lazy_static! {
    // Date part of an ISO-8601 value; anything after it must be a time-of-day and/or offset.
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:[T ][0-9:.,]*(?:Z|[+-]\d{2}(?::?\d{2})?)?)?$").expect("valid regex");
}

/// Parses an ISO-8601 date or date-time into a calendar date, dropping time-of-day and timezone.
pub fn parse_calendar_date(raw: &str) -> Result<Date> {
    let caps = ISO_DATE.captures(raw.trim()).ok_or_else(|| RagError::MalformedDate(raw.to_string()))?;
    Date::parse(&caps[1], format_description!("[year]-[month]-[day]")).map_err(|_| RagError::MalformedDate(raw.to_string()))
}
