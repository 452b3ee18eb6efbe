//! crates/attendance_core/src/schema.rs
//!
//! Explicit document shapes for every collection the engine reads or writes.
//! Documents that do not match are rejected with `PortError::Malformed` instead of
//! being trusted as they come out of the store.

use crate::domain::{
    AttendanceDate, Course, CourseAttendance, StudentAttendanceSummary, SummaryJob,
};
use crate::ports::{PortError, PortResult, StoredDocument};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const ATTENDANCE: &str = "attendance";
pub const STUDENT_ATTENDANCE: &str = "student_attendance";
pub const COURSES: &str = "courses";
pub const SUMMARY_JOBS: &str = "summary_jobs";

//=========================================================================================
// Document Record Structs
//=========================================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AttendanceDateDoc {
    course_id: String,
    date: NaiveDate,
    present_student_ids: Vec<String>,
    marked_by: String,
    #[serde(default)]
    marked_by_name: String,
    marked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CourseAttendanceDoc {
    dates_present: Vec<NaiveDate>,
    total_classes: u32,
    attended: u32,
    percentage: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StudentSummaryDoc {
    student_id: String,
    attendance_by_course: BTreeMap<String, CourseAttendanceDoc>,
}

// Course documents are owned elsewhere and may carry fields we do not use.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseDoc {
    course_id: String,
    title: String,
    #[serde(default)]
    teacher_id: String,
    #[serde(default)]
    student_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SummaryJobDoc {
    course_id: String,
    date: NaiveDate,
    student_ids: Vec<String>,
    created_at: DateTime<Utc>,
}

//=========================================================================================
// Decoding
//=========================================================================================

fn decode<T: DeserializeOwned>(collection: &str, doc: &StoredDocument) -> PortResult<T> {
    T::deserialize(&doc.body).map_err(|e| PortError::Malformed {
        collection: collection.to_string(),
        id: doc.id.clone(),
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(collection: &str, id: &str, doc: &T) -> PortResult<Value> {
    serde_json::to_value(doc).map_err(|e| PortError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn malformed(collection: &str, id: &str, reason: impl Into<String>) -> PortError {
    PortError::Malformed {
        collection: collection.to_string(),
        id: id.to_string(),
        reason: reason.into(),
    }
}

pub fn decode_attendance(doc: &StoredDocument) -> PortResult<AttendanceDate> {
    let record: AttendanceDateDoc = decode(ATTENDANCE, doc)?;
    let present: BTreeSet<String> = record.present_student_ids.into_iter().collect();
    if present.iter().any(|id| id.trim().is_empty()) {
        return Err(malformed(ATTENDANCE, &doc.id, "blank student id in presentStudentIds"));
    }
    Ok(AttendanceDate {
        course_id: record.course_id,
        date: record.date,
        present_student_ids: present,
        marked_by: record.marked_by,
        marked_by_name: record.marked_by_name,
        marked_at: record.marked_at,
        version: doc.version,
    })
}

pub fn encode_attendance(attendance: &AttendanceDate) -> PortResult<Value> {
    let record = AttendanceDateDoc {
        course_id: attendance.course_id.clone(),
        date: attendance.date,
        present_student_ids: attendance.present_student_ids.iter().cloned().collect(),
        marked_by: attendance.marked_by.clone(),
        marked_by_name: attendance.marked_by_name.clone(),
        marked_at: attendance.marked_at,
    };
    encode(ATTENDANCE, &attendance.document_id(), &record)
}

pub fn decode_summary(doc: &StoredDocument) -> PortResult<StudentAttendanceSummary> {
    let record: StudentSummaryDoc = decode(STUDENT_ATTENDANCE, doc)?;
    let mut attendance_by_course = BTreeMap::new();
    for (course_id, entry) in record.attendance_by_course {
        let dates_present: BTreeSet<NaiveDate> = entry.dates_present.into_iter().collect();
        if entry.attended as usize != dates_present.len() || entry.attended > entry.total_classes {
            return Err(malformed(
                STUDENT_ATTENDANCE,
                &doc.id,
                format!("inconsistent counts for course {}", course_id),
            ));
        }
        attendance_by_course.insert(
            course_id,
            CourseAttendance {
                dates_present,
                total_classes: entry.total_classes,
                attended: entry.attended,
                percentage: entry.percentage,
            },
        );
    }
    Ok(StudentAttendanceSummary {
        student_id: record.student_id,
        attendance_by_course,
    })
}

pub fn encode_summary(summary: &StudentAttendanceSummary) -> PortResult<Value> {
    let record = StudentSummaryDoc {
        student_id: summary.student_id.clone(),
        attendance_by_course: summary
            .attendance_by_course
            .iter()
            .map(|(course_id, entry)| {
                (
                    course_id.clone(),
                    CourseAttendanceDoc {
                        dates_present: entry.dates_present.iter().copied().collect(),
                        total_classes: entry.total_classes,
                        attended: entry.attended,
                        percentage: entry.percentage,
                    },
                )
            })
            .collect(),
    };
    encode(STUDENT_ATTENDANCE, &summary.student_id, &record)
}

pub fn decode_course(doc: &StoredDocument) -> PortResult<Course> {
    let record: CourseDoc = decode(COURSES, doc)?;
    Ok(Course {
        course_id: record.course_id,
        title: record.title,
        teacher_id: record.teacher_id,
        student_ids: record.student_ids,
    })
}

pub fn encode_course(course: &Course) -> PortResult<Value> {
    let record = CourseDoc {
        course_id: course.course_id.clone(),
        title: course.title.clone(),
        teacher_id: course.teacher_id.clone(),
        student_ids: course.student_ids.clone(),
    };
    encode(COURSES, &course.course_id, &record)
}

pub fn decode_job(doc: &StoredDocument) -> PortResult<SummaryJob> {
    let record: SummaryJobDoc = decode(SUMMARY_JOBS, doc)?;
    Ok(SummaryJob {
        course_id: record.course_id,
        date: record.date,
        student_ids: record.student_ids.into_iter().collect(),
        created_at: record.created_at,
    })
}

pub fn encode_job(job: &SummaryJob) -> PortResult<Value> {
    let record = SummaryJobDoc {
        course_id: job.course_id.clone(),
        date: job.date,
        student_ids: job.student_ids.iter().cloned().collect(),
        created_at: job.created_at,
    };
    encode(SUMMARY_JOBS, &job.document_id(), &record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(id: &str, body: Value) -> StoredDocument {
        StoredDocument { id: id.to_string(), version: 3, body }
    }

    #[test]
    fn attendance_document_decodes_with_store_version() {
        let doc = stored(
            "C1_2025-06-24",
            json!({
                "courseId": "C1",
                "date": "2025-06-24",
                "presentStudentIds": ["S2", "S1", "S1"],
                "markedBy": "T1",
                "markedByName": "Ms. Lee",
                "markedAt": "2025-06-24T09:00:00Z"
            }),
        );
        let attendance = decode_attendance(&doc).unwrap();
        assert_eq!(attendance.version, 3);
        assert_eq!(attendance.present_student_ids.len(), 2);
        assert_eq!(attendance.document_id(), "C1_2025-06-24");
    }

    #[test]
    fn unexpected_shapes_are_rejected() {
        let wrong_type = stored(
            "C1_2025-06-24",
            json!({
                "courseId": "C1",
                "date": "2025-06-24",
                "presentStudentIds": "S1,S2",
                "markedBy": "T1",
                "markedAt": "2025-06-24T09:00:00Z"
            }),
        );
        assert!(matches!(decode_attendance(&wrong_type), Err(PortError::Malformed { .. })));

        let extra_field = stored(
            "C1_2025-06-24",
            json!({
                "courseId": "C1",
                "date": "2025-06-24",
                "presentStudentIds": [],
                "markedBy": "T1",
                "markedAt": "2025-06-24T09:00:00Z",
                "status": "late"
            }),
        );
        assert!(matches!(decode_attendance(&extra_field), Err(PortError::Malformed { .. })));
    }

    #[test]
    fn summary_with_inconsistent_counts_is_rejected() {
        let doc = stored(
            "S1",
            json!({
                "studentId": "S1",
                "attendanceByCourse": {
                    "C1": {"datesPresent": ["2025-06-24"], "totalClasses": 2, "attended": 2, "percentage": 100.0}
                }
            }),
        );
        assert!(matches!(decode_summary(&doc), Err(PortError::Malformed { .. })));
    }

    #[test]
    fn course_documents_tolerate_foreign_fields() {
        let doc = stored(
            "C1",
            json!({"courseId": "C1", "title": "Algebra", "teacherId": "T1", "studentIds": ["S1"], "syllabus": "..."}),
        );
        assert_eq!(decode_course(&doc).unwrap().student_ids, vec!["S1".to_string()]);
    }
}
