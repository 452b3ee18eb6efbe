use attendance_core::aggregate::filter_records;
use attendance_core::export::{format_for_export, parse_csv};
use attendance_core::{
    AttendanceError, AttendanceService, AttendanceStatus, DateRange, ExportFormat, MarkAttendance,
    MemoryDocumentStore, RecordFilter,
};
use chrono::{NaiveDate, TimeZone, Utc};
use std::io::{Cursor, Read};
use std::sync::Arc;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

async fn service_with_history() -> AttendanceService {
    let service = AttendanceService::new(Arc::new(MemoryDocumentStore::new()));
    for (course, date, present) in [
        ("C1", "2025-06-23", vec!["S1"]),
        ("C1", "2025-06-24", vec!["S2"]),
        ("C2", "2025-06-24", vec!["S1", "S2"]),
        ("C1", "2025-07-01", vec!["S1"]),
    ] {
        service
            .mark_attendance(MarkAttendance {
                course_id: course.to_string(),
                date: date.to_string(),
                present_student_ids: present.into_iter().map(String::from).collect(),
                teacher_id: "T1".to_string(),
                teacher_name: "Ms. Lee".to_string(),
            })
            .await
            .expect("mark");
    }
    service
}

fn june() -> RecordFilter {
    RecordFilter {
        range: DateRange::new(Some(d("2025-06-01")), Some(d("2025-06-30"))),
        ..RecordFilter::default()
    }
}

#[tokio::test]
async fn csv_export_round_trips_the_filtered_records() {
    let service = service_with_history().await;
    let generated_at = Utc.with_ymd_and_hms(2025, 7, 2, 12, 0, 0).unwrap();
    let file = service
        .export_student_attendance("S1", &june(), ExportFormat::Csv, generated_at)
        .await
        .expect("export");

    assert_eq!(file.filename, "attendance_S1_2025-06-01_2025-06-30.csv");
    assert!(file.content_type.starts_with("text/csv"));

    let report = service
        .get_student_attendance_summary("S1", DateRange::default())
        .await
        .expect("report");
    let expected = format_for_export(&filter_records(&report.records, &june()));
    assert_eq!(expected.len(), 3);

    let text = String::from_utf8(file.bytes).expect("utf8");
    assert_eq!(parse_csv(&text).expect("parse"), expected);
    assert!(text.contains("# Generated At: 2025-07-02T12:00:00Z"));
}

#[tokio::test]
async fn status_filter_narrows_the_export() {
    let service = service_with_history().await;
    let filter = RecordFilter {
        status: Some(AttendanceStatus::Absent),
        ..june()
    };
    let file = service
        .export_student_attendance("S1", &filter, ExportFormat::Csv, Utc::now())
        .await
        .expect("export");
    let rows = parse_csv(&String::from_utf8(file.bytes).expect("utf8")).expect("parse");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].date, "2025-06-24");
    assert_eq!(rows[0].course, "C1");
    assert_eq!(rows[0].status, "absent");
    assert_eq!(rows[0].marked_by, "Ms. Lee");
}

#[tokio::test]
async fn inverted_range_is_an_empty_result() {
    let service = service_with_history().await;
    let filter = RecordFilter {
        range: DateRange::new(Some(d("2025-06-30")), Some(d("2025-06-01"))),
        ..RecordFilter::default()
    };
    let err = service
        .export_student_attendance("S1", &filter, ExportFormat::Csv, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::EmptyResult(_)), "got {err:?}");
}

#[tokio::test]
async fn unmatched_course_is_an_empty_result() {
    let service = service_with_history().await;
    let filter = RecordFilter {
        course_id: Some("C9".to_string()),
        ..RecordFilter::default()
    };
    let err = service
        .export_student_attendance("S1", &filter, ExportFormat::Xlsx, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::EmptyResult(_)));
}

#[tokio::test]
async fn xlsx_export_is_a_spreadsheet_package() {
    let service = service_with_history().await;
    let file = service
        .export_student_attendance("S2", &RecordFilter::default(), ExportFormat::Xlsx, Utc::now())
        .await
        .expect("export");
    assert_eq!(file.filename, "attendance_S2_start_end.xlsx");
    assert_eq!(file.content_type, ExportFormat::Xlsx.content_type());

    let mut archive = zip::ZipArchive::new(Cursor::new(file.bytes)).expect("zip");
    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet")
        .read_to_string(&mut sheet)
        .expect("read sheet");
    // Header plus one row per course date.
    assert_eq!(sheet.matches("<row ").count(), 5);
    assert!(sheet.contains("2025-07-01"));

    let mut info = String::new();
    archive
        .by_name("xl/worksheets/sheet2.xml")
        .expect("info sheet")
        .read_to_string(&mut info)
        .expect("read info");
    assert!(info.contains("Student"));
    assert!(info.contains("S2"));
}
