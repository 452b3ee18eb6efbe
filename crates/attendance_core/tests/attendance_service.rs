use attendance_core::schema::{self, COURSES, STUDENT_ATTENDANCE, SUMMARY_JOBS};
use attendance_core::{
    AttendanceError, AttendanceService, AttendanceStatus, Course, DateRange, DocumentStore,
    MarkAttendance, MemoryDocumentStore, StudentAttendanceSummary,
};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn setup() -> (Arc<MemoryDocumentStore>, AttendanceService) {
    let store = Arc::new(MemoryDocumentStore::new());
    let service = AttendanceService::new(store.clone());
    (store, service)
}

async fn seed_course(store: &MemoryDocumentStore, course_id: &str, title: &str, roster: &[&str]) {
    let course = Course {
        course_id: course_id.to_string(),
        title: title.to_string(),
        teacher_id: "T1".to_string(),
        student_ids: roster.iter().map(|s| s.to_string()).collect(),
    };
    store
        .set(COURSES, course_id, schema::encode_course(&course).expect("encode"), None)
        .await
        .expect("seed course");
}

fn mark(course: &str, date: &str, present: &[&str]) -> MarkAttendance {
    MarkAttendance {
        course_id: course.to_string(),
        date: date.to_string(),
        present_student_ids: present.iter().map(|s| s.to_string()).collect(),
        teacher_id: "T1".to_string(),
        teacher_name: "Ms. Lee".to_string(),
    }
}

#[tokio::test]
async fn marked_attendance_reads_back() {
    let (_store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("mark");

    let attendance = service
        .get_attendance_by_date("C1", "2025-06-24")
        .await
        .expect("read back");
    assert_eq!(
        attendance.present_student_ids.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["S1", "S2"]
    );
    assert_eq!(attendance.marked_by, "T1");
    assert_eq!(attendance.marked_by_name, "Ms. Lee");
    assert_eq!(attendance.version, 1);
}

#[tokio::test]
async fn second_mark_replaces_the_first() {
    let (_store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("first mark");
    let second = service
        .mark_attendance(mark("C1", "2025-06-24", &["S3"]))
        .await
        .expect("second mark");
    assert_eq!(second.version, 2);

    let attendance = service
        .get_attendance_by_date("C1", "2025-06-24")
        .await
        .expect("read back");
    assert_eq!(
        attendance.present_student_ids.into_iter().collect::<Vec<_>>(),
        vec!["S3".to_string()]
    );

    let history = service
        .get_course_attendance("C1", DateRange::default())
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let (_store, service) = setup();
    for cmd in [
        mark("C1", "24-06-2025", &["S1"]),
        mark("C1", "2025-13-01", &["S1"]),
        mark("", "2025-06-24", &["S1"]),
        mark("C1", "2025-06-24", &["S1", ""]),
        MarkAttendance {
            teacher_id: " ".to_string(),
            ..mark("C1", "2025-06-24", &["S1"])
        },
    ] {
        let err = service.mark_attendance(cmd).await.unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)), "got {err:?}");
    }
}

#[tokio::test]
async fn missing_date_is_not_found() {
    let (_store, service) = setup();
    let err = service
        .get_attendance_by_date("C1", "2025-06-24")
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NotFound(_)));
}

#[tokio::test]
async fn summaries_track_roster_and_presence() {
    let (store, service) = setup();
    seed_course(&store, "C1", "Algebra", &["S1", "S2", "S3"]).await;
    service
        .mark_attendance(mark("C1", "2025-06-23", &["S1", "S2"]))
        .await
        .expect("mark 23");
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1"]))
        .await
        .expect("mark 24");

    let s1 = service
        .get_student_attendance_summary("S1", DateRange::default())
        .await
        .expect("S1");
    assert_eq!((s1.total_classes, s1.attended, s1.percentage), (2, 2, 100.0));

    let s2 = service
        .get_student_attendance_summary("S2", DateRange::default())
        .await
        .expect("S2");
    assert_eq!((s2.total_classes, s2.attended, s2.percentage), (2, 1, 50.0));
    assert_eq!(s2.records.len(), 2);
    assert_eq!(s2.records[0].course_title.as_deref(), Some("Algebra"));

    // Enrolled but never present still gets a zero entry.
    let s3 = service
        .get_student_attendance_summary("S3", DateRange::default())
        .await
        .expect("S3");
    assert_eq!((s3.total_classes, s3.attended, s3.percentage), (2, 0, 0.0));
    let entry = &s3.courses["C1"];
    assert_eq!(entry.attended as usize, entry.dates_present.len());
}

#[tokio::test]
async fn update_removes_dropped_students_from_their_summary() {
    let (_store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("mark");
    service
        .update_attendance(mark("C1", "2025-06-24", &["S1"]), None)
        .await
        .expect("update");

    let s2 = service
        .get_student_attendance_summary("S2", DateRange::default())
        .await
        .expect("S2 summary");
    let entry = &s2.courses["C1"];
    assert!(entry.dates_present.is_empty());
    assert_eq!((entry.total_classes, entry.attended), (1, 0));
    assert_eq!(s2.percentage, 0.0);
}

#[tokio::test]
async fn update_of_unmarked_date_is_not_found() {
    let (_store, service) = setup();
    let err = service
        .update_attendance(mark("C1", "2025-06-24", &["S1"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NotFound(_)));
}

#[tokio::test]
async fn stale_correction_is_a_conflict() {
    let (store, service) = setup();
    let first = service
        .mark_attendance(mark("C1", "2025-06-24", &["S1"]))
        .await
        .expect("mark");
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("concurrent mark");

    let err = service
        .update_attendance(mark("C1", "2025-06-24", &["S3"]), Some(first.version))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Conflict(_)), "got {err:?}");

    let current = service
        .get_attendance_by_date("C1", "2025-06-24")
        .await
        .expect("current");
    assert_eq!(current.present_student_ids.len(), 2);
    assert!(store.query(SUMMARY_JOBS, &[]).await.expect("jobs").is_empty());

    let corrected = service
        .update_attendance(mark("C1", "2025-06-24", &["S3"]), Some(current.version))
        .await
        .expect("fresh correction");
    assert_eq!(corrected.version, current.version + 1);
}

#[tokio::test]
async fn course_attendance_is_ordered_and_range_limited() {
    let (_store, service) = setup();
    for date in ["2025-06-26", "2025-06-23", "2025-06-25", "2025-06-24"] {
        service
            .mark_attendance(mark("C1", date, &["S1"]))
            .await
            .expect("mark");
    }
    service
        .mark_attendance(mark("C2", "2025-06-24", &["S1"]))
        .await
        .expect("other course");

    let all = service
        .get_course_attendance("C1", DateRange::default())
        .await
        .expect("all");
    let dates: Vec<_> = all.iter().map(|a| a.date.to_string()).collect();
    assert_eq!(dates, vec!["2025-06-23", "2025-06-24", "2025-06-25", "2025-06-26"]);

    let window = service
        .get_course_attendance("C1", DateRange::new(Some(d("2025-06-24")), Some(d("2025-06-25"))))
        .await
        .expect("window");
    assert_eq!(window.len(), 2);

    let inverted = service
        .get_course_attendance("C1", DateRange::new(Some(d("2025-06-26")), Some(d("2025-06-23"))))
        .await
        .expect("inverted");
    assert!(inverted.is_empty());
}

#[tokio::test]
async fn ranged_summary_counts_only_classes_inside_the_range() {
    let (_store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-23", &["S1"]))
        .await
        .expect("mark");
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S2"]))
        .await
        .expect("mark");
    service
        .mark_attendance(mark("C1", "2025-06-25", &["S1"]))
        .await
        .expect("mark");

    let report = service
        .get_student_attendance_summary("S1", DateRange::new(None, Some(d("2025-06-24"))))
        .await
        .expect("report");
    assert_eq!((report.total_classes, report.attended, report.percentage), (2, 1, 50.0));
    assert_eq!(report.records.len(), 2);
}

#[tokio::test]
async fn daily_stats_use_course_roster() {
    let (store, service) = setup();
    seed_course(&store, "C1", "Algebra", &["S1", "S2", "S3", "S4", "S5"]).await;
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("mark");

    let stats = service.get_daily_stats("C1", "2025-06-24").await.expect("stats");
    assert_eq!(stats.total_students, 5);
    assert_eq!(stats.present_students, 2);
    assert_eq!(stats.absent_students, 3);
    assert_eq!(stats.attendance_percentage, 40.0);
}

#[tokio::test]
async fn daily_stats_without_course_is_not_found() {
    let (_store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1"]))
        .await
        .expect("mark");
    let err = service.get_daily_stats("C1", "2025-06-24").await.unwrap_err();
    assert!(matches!(err, AttendanceError::NotFound(_)));
}

#[tokio::test]
async fn unknown_student_is_not_found() {
    let (_store, service) = setup();
    let err = service
        .get_student_attendance_summary("nobody", DateRange::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NotFound(_)));
}

#[tokio::test]
async fn missing_summary_is_recomputed_lazily() {
    let (store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1"]))
        .await
        .expect("mark");
    store.delete(STUDENT_ATTENDANCE, "S1").await.expect("drop cache");

    let report = service
        .get_student_attendance_summary("S1", DateRange::default())
        .await
        .expect("report");
    assert_eq!((report.total_classes, report.attended), (1, 1));
    assert!(store.get(STUDENT_ATTENDANCE, "S1").await.expect("get").is_some());
}

#[tokio::test]
async fn recompute_matches_write_through_summary() {
    let (store, service) = setup();
    seed_course(&store, "C1", "Algebra", &["S1", "S2"]).await;
    seed_course(&store, "C2", "Biology", &["S1"]).await;
    service
        .mark_attendance(mark("C1", "2025-06-23", &["S1"]))
        .await
        .expect("mark");
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S2"]))
        .await
        .expect("mark");
    service
        .mark_attendance(mark("C2", "2025-06-24", &["S1"]))
        .await
        .expect("mark");

    let cached = schema::decode_summary(
        &store
            .get(STUDENT_ATTENDANCE, "S1")
            .await
            .expect("get")
            .expect("cached summary"),
    )
    .expect("decode");
    let rebuilt = service.recompute_student_summary("S1").await.expect("recompute");
    assert_eq!(cached, rebuilt);
    assert_eq!(rebuilt.attendance_by_course["C1"].percentage, 50.0);
    assert_eq!(rebuilt.attendance_by_course["C2"].percentage, 100.0);
}

#[tokio::test]
async fn partial_summary_failure_is_replayable() {
    let (store, service) = setup();
    store.fail_writes_to(STUDENT_ATTENDANCE, "S2");

    let err = service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Store(_)), "got {err:?}");

    // The attendance document itself was written and S1 is already up to date.
    assert!(service.get_attendance_by_date("C1", "2025-06-24").await.is_ok());
    assert!(store.get(STUDENT_ATTENDANCE, "S1").await.expect("get").is_some());
    assert!(store.get(STUDENT_ATTENDANCE, "S2").await.expect("get").is_none());
    assert_eq!(store.query(SUMMARY_JOBS, &[]).await.expect("jobs").len(), 1);

    store.clear_write_failures();
    assert_eq!(service.replay_pending_jobs().await.expect("replay"), 1);
    assert!(store.query(SUMMARY_JOBS, &[]).await.expect("jobs").is_empty());

    let s2 = schema::decode_summary(
        &store
            .get(STUDENT_ATTENDANCE, "S2")
            .await
            .expect("get")
            .expect("S2 summary"),
    )
    .expect("decode");
    assert_eq!(s2.attendance_by_course["C1"].attended, 1);
    assert_eq!(service.replay_pending_jobs().await.expect("nothing left"), 0);
}

async fn cached_summary(store: &MemoryDocumentStore, student_id: &str) -> StudentAttendanceSummary {
    schema::decode_summary(
        &store
            .get(STUDENT_ATTENDANCE, student_id)
            .await
            .expect("get")
            .expect("cached summary"),
    )
    .expect("decode")
}

#[tokio::test]
async fn rejected_correction_keeps_pending_summary_job() {
    let (store, service) = setup();
    let first = service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("mark");

    store.fail_writes_to(STUDENT_ATTENDANCE, "S2");
    let err = service
        .update_attendance(mark("C1", "2025-06-24", &["S1"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Store(_)), "got {err:?}");

    let err = service
        .update_attendance(mark("C1", "2025-06-24", &["S1"]), Some(first.version))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Conflict(_)), "got {err:?}");
    assert_eq!(store.query(SUMMARY_JOBS, &[]).await.expect("jobs").len(), 1);

    store.clear_write_failures();
    assert_eq!(service.replay_pending_jobs().await.expect("replay"), 1);
    let s2 = cached_summary(&store, "S2").await;
    assert_eq!(s2.attendance_by_course["C1"].attended, 0);
    assert_eq!(s2.attendance_by_course["C1"].total_classes, 1);
}

#[tokio::test]
async fn later_write_finishes_pending_summary_repairs() {
    let (store, service) = setup();
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .expect("mark");

    store.fail_writes_to(STUDENT_ATTENDANCE, "S2");
    service
        .update_attendance(mark("C1", "2025-06-24", &["S1"]), None)
        .await
        .unwrap_err();
    store.clear_write_failures();

    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1"]))
        .await
        .expect("remark");
    assert!(store.query(SUMMARY_JOBS, &[]).await.expect("jobs").is_empty());

    let report = service
        .get_student_attendance_summary("S2", DateRange::default())
        .await
        .expect("report");
    assert_eq!(report.total_classes, 1);
    assert_eq!(report.attended, 0);
    assert!(report
        .records
        .iter()
        .all(|r| r.status == AttendanceStatus::Absent));
}

#[tokio::test]
async fn unreadable_job_does_not_block_replay() {
    let (store, service) = setup();
    store.fail_writes_to(STUDENT_ATTENDANCE, "S2");
    service
        .mark_attendance(mark("C1", "2025-06-24", &["S1", "S2"]))
        .await
        .unwrap_err();
    store.clear_write_failures();
    store
        .set(SUMMARY_JOBS, "C9_2025-06-01", json!({"bogus": true}), None)
        .await
        .expect("seed broken job");

    assert_eq!(service.replay_pending_jobs().await.expect("replay"), 1);
    assert_eq!(cached_summary(&store, "S2").await.attendance_by_course["C1"].attended, 1);
}

#[tokio::test]
async fn malformed_documents_are_store_errors() {
    let (store, service) = setup();
    store
        .set(
            "attendance",
            "C1_2025-06-24",
            json!({"courseId": "C1", "date": "June 24", "presentStudentIds": [], "markedBy": "T1", "markedAt": "2025-06-24T09:00:00Z"}),
            None,
        )
        .await
        .expect("seed");
    let err = service
        .get_attendance_by_date("C1", "2025-06-24")
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::Store(_)), "got {err:?}");
}
