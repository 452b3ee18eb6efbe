//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    ApiResponse, AttendanceDateView, AttendanceRecordView, CourseAttendanceView, DailyStatsView,
    DateRangeQuery, ExportQuery, HealthView, MarkAttendanceRequest, ReplayView,
    StudentAttendanceQuery, StudentAttendanceView, StudentSummaryView,
};
use crate::web::state::AppState;
use attendance_core::{
    aggregate, validation, AttendanceError, ExportFormat, MarkAttendance, RecordFilter,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        mark_attendance_handler,
        update_attendance_handler,
        course_attendance_handler,
        attendance_by_date_handler,
        daily_stats_handler,
        student_attendance_handler,
        export_attendance_handler,
        recompute_summary_handler,
        replay_jobs_handler,
    ),
    components(
        schemas(
            MarkAttendanceRequest,
            AttendanceDateView,
            DailyStatsView,
            CourseAttendanceView,
            AttendanceRecordView,
            StudentAttendanceView,
            StudentSummaryView,
            ReplayView,
            HealthView,
        )
    ),
    tags(
        (name = "Attendance API", description = "Attendance marking, aggregation and export.")
    )
)]
pub struct ApiDoc;

type ApiResult<T> = Result<T, ApiError>;

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    ApiError::Attendance(AttendanceError::Validation(e.to_string()))
}

fn into_command(req: MarkAttendanceRequest) -> (MarkAttendance, Option<u64>) {
    (
        MarkAttendance {
            course_id: req.course_id,
            date: req.date,
            present_student_ids: req.present_student_ids,
            teacher_id: req.teacher_id,
            teacher_name: req.teacher_name,
        },
        req.expected_version,
    )
}

fn record_filter(
    start_date: Option<&str>,
    end_date: Option<&str>,
    course_id: Option<String>,
    status: Option<&str>,
) -> Result<RecordFilter, AttendanceError> {
    Ok(RecordFilter {
        range: validation::parse_range(start_date, end_date)?,
        course_id: course_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        status: validation::parse_status(status)?,
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = ApiResponse<HealthView>))
)]
pub async fn health_handler() -> Json<ApiResponse<HealthView>> {
    Json(ApiResponse::ok(HealthView {
        status: "ok".to_string(),
    }))
}

/// Mark attendance for a course on a date.
///
/// Overwrites any attendance already recorded for that course and date.
#[utoipa::path(
    post,
    path = "/attendance",
    request_body = MarkAttendanceRequest,
    responses(
        (status = 201, description = "Attendance recorded", body = ApiResponse<AttendanceDateView>),
        (status = 400, description = "Malformed date or missing fields"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn mark_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<MarkAttendanceRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AttendanceDateView>>)> {
    let Json(req) = payload.map_err(bad_request)?;
    let (cmd, _) = into_command(req);
    let attendance = app_state.attendance.mark_attendance(cmd).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(attendance.into()))))
}

/// Correct an already submitted attendance date.
///
/// The present list fully replaces the stored one. Supplying `expectedVersion`
/// turns a concurrent edit into a 409 instead of a silent overwrite.
#[utoipa::path(
    put,
    path = "/attendance",
    request_body = MarkAttendanceRequest,
    responses(
        (status = 200, description = "Attendance corrected", body = ApiResponse<AttendanceDateView>),
        (status = 400, description = "Malformed date or missing fields"),
        (status = 404, description = "Nothing recorded for that course and date"),
        (status = 409, description = "Stale expectedVersion"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn update_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<MarkAttendanceRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<AttendanceDateView>>> {
    let Json(req) = payload.map_err(bad_request)?;
    let (cmd, expected_version) = into_command(req);
    let attendance = app_state
        .attendance
        .update_attendance(cmd, expected_version)
        .await?;
    Ok(Json(ApiResponse::ok(attendance.into())))
}

/// List a course's attendance dates, oldest first.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/attendance",
    params(("course_id" = String, Path, description = "Course identifier"), DateRangeQuery),
    responses(
        (status = 200, description = "Attendance dates in range", body = ApiResponse<Vec<AttendanceDateView>>),
        (status = 400, description = "Malformed date")
    )
)]
pub async fn course_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<AttendanceDateView>>>> {
    let Query(q) = query.map_err(bad_request)?;
    let range = validation::parse_range(q.start_date.as_deref(), q.end_date.as_deref())?;
    let dates = app_state
        .attendance
        .get_course_attendance(&course_id, range)
        .await?;
    Ok(Json(ApiResponse::ok(
        dates.into_iter().map(AttendanceDateView::from).collect(),
    )))
}

/// Fetch the attendance recorded for one course date.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/attendance/{date}",
    params(
        ("course_id" = String, Path, description = "Course identifier"),
        ("date" = String, Path, description = "YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Attendance for the date", body = ApiResponse<AttendanceDateView>),
        (status = 404, description = "Nothing recorded")
    )
)]
pub async fn attendance_by_date_handler(
    State(app_state): State<Arc<AppState>>,
    Path((course_id, date)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<AttendanceDateView>>> {
    let attendance = app_state
        .attendance
        .get_attendance_by_date(&course_id, &date)
        .await?;
    Ok(Json(ApiResponse::ok(attendance.into())))
}

/// Present/absent counts for one course date against the course roster.
#[utoipa::path(
    get,
    path = "/courses/{course_id}/attendance/{date}/stats",
    params(
        ("course_id" = String, Path, description = "Course identifier"),
        ("date" = String, Path, description = "YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Daily statistics", body = ApiResponse<DailyStatsView>),
        (status = 404, description = "Course or date not found")
    )
)]
pub async fn daily_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Path((course_id, date)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<DailyStatsView>>> {
    let stats = app_state.attendance.get_daily_stats(&course_id, &date).await?;
    Ok(Json(ApiResponse::ok(DailyStatsView::new(&course_id, &date, stats))))
}

/// A student's attendance totals with one page of filtered records.
#[utoipa::path(
    get,
    path = "/students/{student_id}/attendance",
    params(("student_id" = String, Path, description = "Student identifier"), StudentAttendanceQuery),
    responses(
        (status = 200, description = "Summary and records", body = ApiResponse<StudentAttendanceView>),
        (status = 400, description = "Malformed filter or paging values"),
        (status = 404, description = "Unknown student")
    )
)]
pub async fn student_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    query: Result<Query<StudentAttendanceQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<StudentAttendanceView>>> {
    let Query(q) = query.map_err(bad_request)?;
    let filter = record_filter(
        q.start_date.as_deref(),
        q.end_date.as_deref(),
        q.course_id,
        q.status.as_deref(),
    )?;
    let page_size = app_state.page_size(q.page_size);

    let report = app_state
        .attendance
        .get_student_attendance_summary(&student_id, filter.range)
        .await?;
    let filtered = aggregate::filter_records(&report.records, &filter);
    let page = aggregate::paginate(&filtered, q.page.unwrap_or(1), page_size)?;

    Ok(Json(ApiResponse::ok(StudentAttendanceView {
        student_id: report.student_id,
        total_classes: report.total_classes,
        attended: report.attended,
        percentage: report.percentage,
        attendance_by_course: report
            .courses
            .into_iter()
            .map(|(course_id, entry)| (course_id, entry.into()))
            .collect(),
        records: page.records.into_iter().map(AttendanceRecordView::from).collect(),
        current_page: page.current_page,
        total_pages: page.total_pages,
        total_records: page.total_records,
    })))
}

/// Download a student's filtered attendance as CSV or XLSX.
#[utoipa::path(
    get,
    path = "/students/{student_id}/attendance/export",
    params(("student_id" = String, Path, description = "Student identifier"), ExportQuery),
    responses(
        (status = 200, description = "Attachment in the requested format"),
        (status = 400, description = "Malformed filter or unknown format"),
        (status = 404, description = "Unknown student or no matching records")
    )
)]
pub async fn export_attendance_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(q) = query.map_err(bad_request)?;
    let format = q
        .format
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map_or(Ok(ExportFormat::Csv), |f| f.parse::<ExportFormat>())?;
    let filter = record_filter(
        q.start_date.as_deref(),
        q.end_date.as_deref(),
        q.course_id,
        q.status.as_deref(),
    )?;

    let file = app_state
        .attendance
        .export_student_attendance(&student_id, &filter, format, Utc::now())
        .await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        Bytes::from(file.bytes),
    )
        .into_response())
}

/// Rebuild a student's cached summary from the attendance history.
#[utoipa::path(
    post,
    path = "/students/{student_id}/attendance/recompute",
    params(("student_id" = String, Path, description = "Student identifier")),
    responses(
        (status = 200, description = "Rebuilt summary", body = ApiResponse<StudentSummaryView>),
        (status = 404, description = "Student has no attendance or enrollment")
    )
)]
pub async fn recompute_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<ApiResponse<StudentSummaryView>>> {
    let summary = app_state
        .attendance
        .recompute_student_summary(&student_id)
        .await?;
    Ok(Json(ApiResponse::ok(summary.into())))
}

/// Reapply summary updates left pending by partially failed writes.
#[utoipa::path(
    post,
    path = "/maintenance/summary-jobs/replay",
    responses(
        (status = 200, description = "Number of jobs completed", body = ApiResponse<ReplayView>),
        (status = 500, description = "Every pending job failed again")
    )
)]
pub async fn replay_jobs_handler(
    State(app_state): State<Arc<AppState>>,
) -> ApiResult<Json<ApiResponse<ReplayView>>> {
    let replayed = app_state.attendance.replay_pending_jobs().await?;
    info!("Summary job replay finished: {} completed", replayed);
    Ok(Json(ApiResponse::ok(ReplayView { replayed })))
}

/// Envelope for unknown routes.
pub async fn not_found_handler(uri: Uri) -> (StatusCode, Json<ApiResponse<()>>) {
    warn!("No route for {}", uri);
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure(format!("No route for {}", uri.path()))),
    )
}
