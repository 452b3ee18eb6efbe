//! crates/attendance_core/src/domain.rs
//!
//! Defines the pure, core data structures for attendance tracking.
//! These structs are independent of any database or wire format; the document
//! shapes used at the store boundary live in `schema.rs`.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Which students were present for one course on one calendar date.
///
/// There is at most one per `(course_id, date)`; marking the same pair again
/// overwrites the previous document.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceDate {
    pub course_id: String,
    pub date: NaiveDate,
    pub present_student_ids: BTreeSet<String>,
    /// Identifier of the teacher who last marked this date.
    pub marked_by: String,
    pub marked_by_name: String,
    pub marked_at: DateTime<Utc>,
    /// Store-assigned revision, bumped on every write.
    pub version: u64,
}

impl AttendanceDate {
    pub fn document_id(&self) -> String {
        attendance_document_id(&self.course_id, self.date)
    }

    pub fn is_present(&self, student_id: &str) -> bool {
        self.present_student_ids.contains(student_id)
    }
}

/// The store key of the attendance document for a course and date.
pub fn attendance_document_id(course_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", course_id, date.format("%Y-%m-%d"))
}

/// One student's rollup for a single course.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseAttendance {
    pub dates_present: BTreeSet<NaiveDate>,
    pub total_classes: u32,
    pub attended: u32,
    pub percentage: f64,
}

/// Per-student cached rollup across every course the student appears in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StudentAttendanceSummary {
    pub student_id: String,
    pub attendance_by_course: BTreeMap<String, CourseAttendance>,
}

impl StudentAttendanceSummary {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            attendance_by_course: BTreeMap::new(),
        }
    }

    pub fn total_classes(&self) -> u32 {
        self.attendance_by_course.values().map(|c| c.total_classes).sum()
    }

    pub fn attended(&self) -> u32 {
        self.attendance_by_course.values().map(|c| c.attended).sum()
    }
}

/// Reference entity owned by course management. Only read here.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub course_id: String,
    pub title: String,
    pub teacher_id: String,
    pub student_ids: Vec<String>,
}

impl Course {
    pub fn roster_size(&self) -> usize {
        self.student_ids.iter().collect::<BTreeSet<_>>().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status '{}'", other)),
        }
    }
}

/// A single student's view of one course date.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub course_id: String,
    pub course_title: Option<String>,
    pub status: AttendanceStatus,
    pub marked_by: String,
    pub marked_by_name: String,
    pub marked_at: DateTime<Utc>,
}

/// Inclusive date bounds. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// An inverted range matches nothing.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Filters applied to a student's records, in the order course, date range, status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordFilter {
    pub range: DateRange,
    pub course_id: Option<String>,
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyStats {
    pub total_students: usize,
    pub present_students: usize,
    pub absent_students: usize,
    pub attendance_percentage: f64,
}

/// One page of a larger result set. Pages are 1-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_records: usize,
}

/// What `get_student_attendance_summary` returns: totals plus the underlying records.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentAttendanceReport {
    pub student_id: String,
    pub total_classes: u32,
    pub attended: u32,
    pub percentage: f64,
    pub courses: BTreeMap<String, CourseAttendance>,
    pub records: Vec<AttendanceRecord>,
}

/// A pending summary recomputation for every student touched by one attendance write.
/// It is removed once all of their summaries were written and can be replayed otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryJob {
    pub course_id: String,
    pub date: NaiveDate,
    pub student_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl SummaryJob {
    pub fn document_id(&self) -> String {
        attendance_document_id(&self.course_id, self.date)
    }
}
