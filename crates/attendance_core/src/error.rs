//! crates/attendance_core/src/error.rs
//!
//! The error taxonomy surfaced by the attendance engine to its callers.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// Malformed input: date format, missing fields, bad paging values.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An export matched no records.
    #[error("No attendance records to export: {0}")]
    EmptyResult(String),

    /// A correction was submitted against a stale version of the attendance date.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The document store failed or returned a document of the wrong shape.
    #[error("Store error: {0}")]
    Store(PortError),

    #[error("Export rendering failed: {0}")]
    Export(String),
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

impl From<PortError> for AttendanceError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => AttendanceError::NotFound(what),
            PortError::Conflict { .. } => AttendanceError::Conflict(e.to_string()),
            other => AttendanceError::Store(other),
        }
    }
}

impl From<csv::Error> for AttendanceError {
    fn from(e: csv::Error) -> Self {
        AttendanceError::Export(e.to_string())
    }
}

impl From<zip::result::ZipError> for AttendanceError {
    fn from(e: zip::result::ZipError) -> Self {
        AttendanceError::Export(e.to_string())
    }
}

impl From<std::io::Error> for AttendanceError {
    fn from(e: std::io::Error) -> Self {
        AttendanceError::Export(e.to_string())
    }
}
