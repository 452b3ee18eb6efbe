//! services/api/src/web/protocol.rs
//!
//! Defines the JSON wire format between HTTP clients and the attendance API:
//! the `{success, data?, error?}` envelope, request payloads, query parameters
//! and the response views built from core domain types.

use attendance_core::{
    AttendanceDate, AttendanceRecord, CourseAttendance, DailyStats, StudentAttendanceSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Envelope
//=========================================================================================

/// Every JSON response is wrapped in this envelope.
#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

//=========================================================================================
// Requests Sent FROM the Client
//=========================================================================================

/// Payload for marking or correcting one course date.
///
/// Fields default to empty so that missing ones surface as validation errors
/// naming the field rather than as a generic body rejection.
#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkAttendanceRequest {
    pub course_id: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub present_student_ids: Vec<String>,
    pub teacher_id: String,
    pub teacher_name: String,
    /// Only honoured on corrections: reject the write if the stored version differs.
    pub expected_version: Option<u64>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StudentAttendanceQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub course_id: Option<String>,
    /// `present` or `absent`.
    pub status: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `csv` (default) or `xlsx`.
    pub format: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub course_id: Option<String>,
    pub status: Option<String>,
}

//=========================================================================================
// Responses Sent FROM the Server
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDateView {
    pub course_id: String,
    pub date: String,
    pub present_student_ids: Vec<String>,
    pub marked_by: String,
    pub marked_by_name: String,
    pub marked_at: DateTime<Utc>,
    pub version: u64,
}

impl From<AttendanceDate> for AttendanceDateView {
    fn from(a: AttendanceDate) -> Self {
        Self {
            course_id: a.course_id,
            date: a.date.to_string(),
            present_student_ids: a.present_student_ids.into_iter().collect(),
            marked_by: a.marked_by,
            marked_by_name: a.marked_by_name,
            marked_at: a.marked_at,
            version: a.version,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatsView {
    pub course_id: String,
    pub date: String,
    pub total_students: usize,
    pub present_students: usize,
    pub absent_students: usize,
    pub attendance_percentage: f64,
}

impl DailyStatsView {
    pub fn new(course_id: &str, date: &str, stats: DailyStats) -> Self {
        Self {
            course_id: course_id.to_string(),
            date: date.to_string(),
            total_students: stats.total_students,
            present_students: stats.present_students,
            absent_students: stats.absent_students,
            attendance_percentage: stats.attendance_percentage,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseAttendanceView {
    pub dates_present: Vec<String>,
    pub total_classes: u32,
    pub attended: u32,
    pub percentage: f64,
}

impl From<CourseAttendance> for CourseAttendanceView {
    fn from(c: CourseAttendance) -> Self {
        Self {
            dates_present: c.dates_present.iter().map(|d| d.to_string()).collect(),
            total_classes: c.total_classes,
            attended: c.attended,
            percentage: c.percentage,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecordView {
    pub date: String,
    pub course_id: String,
    pub course_title: Option<String>,
    pub status: String,
    pub marked_by: String,
    pub marked_by_name: String,
    pub marked_at: DateTime<Utc>,
}

impl From<AttendanceRecord> for AttendanceRecordView {
    fn from(r: AttendanceRecord) -> Self {
        Self {
            date: r.date.to_string(),
            course_id: r.course_id,
            course_title: r.course_title,
            status: r.status.to_string(),
            marked_by: r.marked_by,
            marked_by_name: r.marked_by_name,
            marked_at: r.marked_at,
        }
    }
}

/// A student's totals with one page of their filtered records.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceView {
    pub student_id: String,
    pub total_classes: u32,
    pub attended: u32,
    pub percentage: f64,
    pub attendance_by_course: BTreeMap<String, CourseAttendanceView>,
    pub records: Vec<AttendanceRecordView>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_records: usize,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummaryView {
    pub student_id: String,
    pub attendance_by_course: BTreeMap<String, CourseAttendanceView>,
}

impl From<StudentAttendanceSummary> for StudentSummaryView {
    fn from(s: StudentAttendanceSummary) -> Self {
        Self {
            student_id: s.student_id,
            attendance_by_course: s
                .attendance_by_course
                .into_iter()
                .map(|(course_id, entry)| (course_id, entry.into()))
                .collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayView {
    pub replayed: usize,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthView {
    pub status: String,
}
