//! Input checks shared by every write and query path.

use crate::domain::{AttendanceStatus, DateRange};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"))
}

/// Parses a `YYYY-MM-DD` calendar date. `2025-02-30` is rejected along with `2025-6-1`.
pub fn parse_date(field: &str, raw: &str) -> AttendanceResult<NaiveDate> {
    let raw = raw.trim();
    if !date_pattern().is_match(raw) {
        return Err(AttendanceError::Validation(format!(
            "{} must match YYYY-MM-DD, got '{}'",
            field, raw
        )));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AttendanceError::Validation(format!("{} is not a valid calendar date: '{}'", field, raw))
    })
}

pub fn parse_optional_date(field: &str, raw: Option<&str>) -> AttendanceResult<Option<NaiveDate>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(field, s).map(Some),
    }
}

pub fn parse_range(start: Option<&str>, end: Option<&str>) -> AttendanceResult<DateRange> {
    Ok(DateRange::new(
        parse_optional_date("startDate", start)?,
        parse_optional_date("endDate", end)?,
    ))
}

pub fn require_field(field: &str, value: &str) -> AttendanceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AttendanceError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Collapses the submitted present list into a set, rejecting blank identifiers.
pub fn normalize_student_ids<I, S>(ids: I) -> AttendanceResult<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for (index, id) in ids.into_iter().enumerate() {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(AttendanceError::Validation(format!(
                "presentStudentIds[{}] must be a non-empty string",
                index
            )));
        }
        set.insert(id.to_string());
    }
    Ok(set)
}

pub fn parse_status(raw: Option<&str>) -> AttendanceResult<Option<AttendanceStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(AttendanceError::Validation),
    }
}
