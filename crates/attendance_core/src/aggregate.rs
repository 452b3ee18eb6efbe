//! crates/attendance_core/src/aggregate.rs
//!
//! Pure statistics over attendance documents: daily rates, per-student rollups,
//! record filtering and pagination. Nothing in here touches the store.

use crate::domain::{
    AttendanceDate, AttendanceRecord, AttendanceStatus, CourseAttendance, DailyStats, Page,
    RecordFilter, StudentAttendanceSummary,
};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}

/// Present students count as present even when they are not on the roster, but they
/// never raise `total_students`, so `absent_students` cannot go negative.
pub fn compute_daily_stats(attendance: &AttendanceDate, roster_size: usize) -> DailyStats {
    let present_students = attendance.present_student_ids.len();
    let attendance_percentage = if roster_size == 0 {
        0.0
    } else {
        round2(present_students as f64 / roster_size as f64 * 100.0)
    };
    DailyStats {
        total_students: roster_size,
        present_students,
        absent_students: roster_size.saturating_sub(present_students),
        attendance_percentage,
    }
}

/// One student's entry for a single course, derived from that course's full history.
pub fn course_attendance_entry(student_id: &str, history: &[AttendanceDate]) -> CourseAttendance {
    let class_dates: BTreeSet<NaiveDate> = history.iter().map(|a| a.date).collect();
    let dates_present: BTreeSet<NaiveDate> = history
        .iter()
        .filter(|a| a.is_present(student_id))
        .map(|a| a.date)
        .collect();
    let total_classes = class_dates.len() as u32;
    let attended = dates_present.len() as u32;
    CourseAttendance {
        dates_present,
        total_classes,
        attended,
        percentage: percentage(attended, total_classes),
    }
}

/// Rebuilds a student's whole summary from per-course histories.
///
/// Each key of `histories` is a course the student belongs to; a course with no
/// recorded dates still yields an entry with zero classes.
pub fn recompute_summary(
    student_id: &str,
    histories: &BTreeMap<String, Vec<AttendanceDate>>,
) -> StudentAttendanceSummary {
    let attendance_by_course = histories
        .iter()
        .map(|(course_id, history)| (course_id.clone(), course_attendance_entry(student_id, history)))
        .collect();
    StudentAttendanceSummary {
        student_id: student_id.to_string(),
        attendance_by_course,
    }
}

/// Expands course histories into one record per (course, date) for a student.
pub fn student_records(
    student_id: &str,
    histories: &BTreeMap<String, Vec<AttendanceDate>>,
    course_titles: &BTreeMap<String, String>,
) -> Vec<AttendanceRecord> {
    let mut records: Vec<AttendanceRecord> = histories
        .iter()
        .flat_map(|(course_id, history)| {
            history.iter().map(move |a| AttendanceRecord {
                date: a.date,
                course_id: course_id.clone(),
                course_title: course_titles.get(course_id).cloned(),
                status: if a.is_present(student_id) {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                },
                marked_by: a.marked_by.clone(),
                marked_by_name: a.marked_by_name.clone(),
                marked_at: a.marked_at,
            })
        })
        .collect();
    sort_records(&mut records);
    records
}

fn sort_records(records: &mut [AttendanceRecord]) {
    records.sort_by(|a, b| (a.date, &a.course_id).cmp(&(b.date, &b.course_id)));
}

/// Applies course, then inclusive date range, then status. The result is ordered by
/// date and course regardless of the input order.
pub fn filter_records(records: &[AttendanceRecord], filter: &RecordFilter) -> Vec<AttendanceRecord> {
    let mut filtered: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| filter.course_id.as_deref().map_or(true, |c| r.course_id == c))
        .filter(|r| filter.range.contains(r.date))
        .filter(|r| filter.status.map_or(true, |s| r.status == s))
        .cloned()
        .collect();
    sort_records(&mut filtered);
    filtered
}

/// 1-indexed pagination. A page past the end is empty rather than an error.
pub fn paginate<T: Clone>(records: &[T], page: usize, page_size: usize) -> AttendanceResult<Page<T>> {
    if page == 0 {
        return Err(AttendanceError::Validation("page must be at least 1".to_string()));
    }
    if page_size == 0 {
        return Err(AttendanceError::Validation("pageSize must be at least 1".to_string()));
    }
    let total_records = records.len();
    let total_pages = total_records.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let page_records = if start >= total_records {
        Vec::new()
    } else {
        let end = start.saturating_add(page_size).min(total_records);
        records[start..end].to_vec()
    };
    Ok(Page {
        records: page_records,
        current_page: page,
        total_pages,
        total_records,
    })
}
