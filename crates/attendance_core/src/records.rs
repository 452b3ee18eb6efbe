//! crates/attendance_core/src/records.rs
//!
//! The attendance service: persists per-date attendance, keeps the per-student
//! summaries in step with it, and answers the read side (course history, student
//! summaries, daily stats, exports).
//!
//! Summaries are a write-through cache. Every write records a `SummaryJob` naming the
//! students it touches before any summary is written, and removes it once all of
//! them succeeded. A job left behind after a partial failure is replayed by
//! `replay_pending_jobs`; applying one is idempotent because each entry is recomputed
//! from the course's full history.

use crate::aggregate;
use crate::domain::{
    attendance_document_id, AttendanceDate, AttendanceStatus, Course, DailyStats, DateRange,
    RecordFilter, StudentAttendanceReport, StudentAttendanceSummary, SummaryJob,
};
use crate::error::{AttendanceError, AttendanceResult};
use crate::export::{self, ExportFile, ExportFormat};
use crate::ports::{DocumentStore, Filter, PortError};
use crate::schema::{self, ATTENDANCE, COURSES, STUDENT_ATTENDANCE, SUMMARY_JOBS};
use crate::validation;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A mark or correction as submitted by a teacher, before validation.
#[derive(Debug, Clone, Default)]
pub struct MarkAttendance {
    pub course_id: String,
    pub date: String,
    pub present_student_ids: Vec<String>,
    pub teacher_id: String,
    pub teacher_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Mark,
    Update { expected_version: Option<u64> },
}

#[derive(Clone)]
pub struct AttendanceService {
    store: Arc<dyn DocumentStore>,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    //=====================================================================================
    // Writes
    //=====================================================================================

    /// Creates or overwrites the attendance for a course and date. The submitted list
    /// replaces whatever was stored before.
    pub async fn mark_attendance(&self, cmd: MarkAttendance) -> AttendanceResult<AttendanceDate> {
        self.write_attendance(cmd, WriteMode::Mark).await
    }

    /// Corrects an attendance date that was already submitted. When `expected_version`
    /// is given, the correction is rejected with `Conflict` if someone else wrote the
    /// date in the meantime.
    pub async fn update_attendance(
        &self,
        cmd: MarkAttendance,
        expected_version: Option<u64>,
    ) -> AttendanceResult<AttendanceDate> {
        self.write_attendance(cmd, WriteMode::Update { expected_version })
            .await
    }

    async fn write_attendance(
        &self,
        cmd: MarkAttendance,
        mode: WriteMode,
    ) -> AttendanceResult<AttendanceDate> {
        let course_id = validation::require_field("courseId", &cmd.course_id)?;
        let date = validation::parse_date("date", &cmd.date)?;
        let teacher_id = validation::require_field("teacherId", &cmd.teacher_id)?;
        let present = validation::normalize_student_ids(&cmd.present_student_ids)?;

        let doc_id = attendance_document_id(&course_id, date);
        let previous = self.load_attendance(&doc_id).await?;
        let pending = self.load_pending_job(&doc_id).await?;
        if let (WriteMode::Update { .. }, None) = (mode, &previous) {
            return Err(AttendanceError::NotFound(format!(
                "no attendance recorded for course {} on {}",
                course_id, date
            )));
        }

        let roster = self
            .load_course(&course_id)
            .await?
            .map(|c| c.student_ids)
            .unwrap_or_default();
        let mut affected: BTreeSet<String> = present.clone();
        affected.extend(roster);
        if let Some(prev) = &previous {
            affected.extend(prev.present_student_ids.iter().cloned());
        }
        // An unfinished job for the same date still owes its students a refresh.
        if let Some(pending) = &pending {
            affected.extend(pending.student_ids.iter().cloned());
        }

        let job = SummaryJob {
            course_id: course_id.clone(),
            date,
            student_ids: affected,
            created_at: pending.as_ref().map_or_else(Utc::now, |p| p.created_at),
        };
        self.store
            .set(SUMMARY_JOBS, &job.document_id(), schema::encode_job(&job)?, None)
            .await?;

        let mut attendance = AttendanceDate {
            course_id,
            date,
            present_student_ids: present,
            marked_by: teacher_id,
            marked_by_name: cmd.teacher_name.trim().to_string(),
            marked_at: Utc::now(),
            version: 0,
        };
        let expected_version = match mode {
            WriteMode::Mark => None,
            WriteMode::Update { expected_version } => expected_version,
        };
        let written = self
            .store
            .set(
                ATTENDANCE,
                &doc_id,
                schema::encode_attendance(&attendance)?,
                expected_version,
            )
            .await;
        attendance.version = match written {
            Ok(version) => version,
            Err(e) => {
                // The attendance is unchanged. A merged job stays for replay; a fresh one
                // has nothing to repair.
                if pending.is_some() {
                    warn!("Attendance write for {} failed, pending summary job kept", doc_id);
                } else if let Err(cleanup) = self.store.delete(SUMMARY_JOBS, &doc_id).await {
                    warn!("Failed to drop summary job {}: {}", doc_id, cleanup);
                }
                return Err(e.into());
            }
        };
        if let Some(prev) = &previous {
            if prev.present_student_ids != attendance.present_student_ids {
                info!(
                    "Attendance for {} replaced: {} -> {} present",
                    doc_id,
                    prev.present_student_ids.len(),
                    attendance.present_student_ids.len()
                );
            }
        }

        self.apply_summary_job(&job).await?;
        info!(
            "Marked attendance for {} ({} present, version {})",
            doc_id,
            attendance.present_student_ids.len(),
            attendance.version
        );
        Ok(attendance)
    }

    /// Recomputes the course entry of every student in the job, then removes the job.
    /// All students are attempted even if some fail; the job then stays for replay.
    ///
    /// Anyone present on an earlier date of the course is refreshed too, since their
    /// `total_classes` moves with every new date.
    async fn apply_summary_job(&self, job: &SummaryJob) -> AttendanceResult<()> {
        let history = self
            .get_course_attendance(&job.course_id, DateRange::default())
            .await?;
        let mut students = job.student_ids.clone();
        for attendance in &history {
            students.extend(attendance.present_student_ids.iter().cloned());
        }

        let mut failed = Vec::new();
        for student_id in &students {
            if let Err(e) = self
                .refresh_course_entry(student_id, &job.course_id, &history)
                .await
            {
                error!(
                    "Failed to update attendance summary of {} for {}: {}",
                    student_id, job.course_id, e
                );
                failed.push(student_id.as_str());
            }
        }

        if !failed.is_empty() {
            return Err(AttendanceError::Store(PortError::Unexpected(format!(
                "{} of {} student summaries not updated for {} ({}); pending job kept for replay",
                failed.len(),
                students.len(),
                job.document_id(),
                failed.join(", ")
            ))));
        }
        self.store.delete(SUMMARY_JOBS, &job.document_id()).await?;
        Ok(())
    }

    async fn refresh_course_entry(
        &self,
        student_id: &str,
        course_id: &str,
        history: &[AttendanceDate],
    ) -> AttendanceResult<()> {
        let mut summary = self
            .load_summary(student_id)
            .await?
            .unwrap_or_else(|| StudentAttendanceSummary::new(student_id));
        summary.attendance_by_course.insert(
            course_id.to_string(),
            aggregate::course_attendance_entry(student_id, history),
        );
        self.save_summary(&summary).await
    }

    /// Reapplies every summary job left behind by a partially failed write.
    /// Returns how many jobs completed.
    pub async fn replay_pending_jobs(&self) -> AttendanceResult<usize> {
        let jobs = self.store.query(SUMMARY_JOBS, &[]).await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        info!("Replaying {} pending summary jobs", jobs.len());
        let mut replayed = 0;
        let mut last_error: Option<AttendanceError> = None;
        for doc in &jobs {
            let job = match schema::decode_job(doc) {
                Ok(job) => job,
                Err(e) => {
                    error!("Skipping unreadable summary job {}: {}", doc.id, e);
                    last_error = Some(e.into());
                    continue;
                }
            };
            match self.apply_summary_job(&job).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    warn!("Summary job {} still failing: {}", doc.id, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if replayed == 0 => Err(e),
            _ => Ok(replayed),
        }
    }

    /// Rebuilds a student's summary from the attendance history and persists it.
    pub async fn recompute_student_summary(
        &self,
        student_id: &str,
    ) -> AttendanceResult<StudentAttendanceSummary> {
        let student_id = validation::require_field("studentId", student_id)?;

        let mut course_ids: BTreeSet<String> = self
            .store
            .query(
                ATTENDANCE,
                &[Filter::array_contains("presentStudentIds", student_id.as_str())],
            )
            .await?
            .iter()
            .map(schema::decode_attendance)
            .map(|a| a.map(|a| a.course_id))
            .collect::<Result<_, _>>()?;
        for doc in self
            .store
            .query(COURSES, &[Filter::array_contains("studentIds", student_id.as_str())])
            .await?
        {
            course_ids.insert(schema::decode_course(&doc)?.course_id);
        }

        if course_ids.is_empty() {
            return Err(AttendanceError::NotFound(format!(
                "no attendance or enrollment for student {}",
                student_id
            )));
        }

        let mut histories = BTreeMap::new();
        for course_id in course_ids {
            let history = self
                .get_course_attendance(&course_id, DateRange::default())
                .await?;
            histories.insert(course_id, history);
        }
        let summary = aggregate::recompute_summary(&student_id, &histories);
        self.save_summary(&summary).await?;
        info!(
            "Recomputed attendance summary for {} across {} courses",
            student_id,
            summary.attendance_by_course.len()
        );
        Ok(summary)
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    pub async fn get_attendance_by_date(
        &self,
        course_id: &str,
        date: &str,
    ) -> AttendanceResult<AttendanceDate> {
        let course_id = validation::require_field("courseId", course_id)?;
        let date = validation::parse_date("date", date)?;
        self.load_attendance(&attendance_document_id(&course_id, date))
            .await?
            .ok_or_else(|| {
                AttendanceError::NotFound(format!(
                    "no attendance recorded for course {} on {}",
                    course_id, date
                ))
            })
    }

    /// Attendance dates of a course inside `range`, ascending. An inverted range is
    /// simply empty.
    pub async fn get_course_attendance(
        &self,
        course_id: &str,
        range: DateRange,
    ) -> AttendanceResult<Vec<AttendanceDate>> {
        let mut filters = vec![Filter::eq("courseId", course_id)];
        if let Some(start) = range.start {
            filters.push(Filter::gte("date", iso(start)));
        }
        if let Some(end) = range.end {
            filters.push(Filter::lte("date", iso(end)));
        }
        let mut dates = self
            .store
            .query(ATTENDANCE, &filters)
            .await?
            .iter()
            .map(schema::decode_attendance)
            .collect::<Result<Vec<_>, _>>()?;
        dates.retain(|a| a.course_id == course_id && range.contains(a.date));
        dates.sort_by_key(|a| a.date);
        Ok(dates)
    }

    /// Totals plus per-date records for one student. Without a range the totals come
    /// from the cached summary; with one they are counted from the records inside it.
    pub async fn get_student_attendance_summary(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> AttendanceResult<StudentAttendanceReport> {
        let student_id = validation::require_field("studentId", student_id)?;
        let summary = match self.load_summary(&student_id).await? {
            Some(summary) if !summary.attendance_by_course.is_empty() => summary,
            _ => {
                info!("No cached summary for {}, recomputing", student_id);
                self.recompute_student_summary(&student_id).await?
            }
        };

        let mut histories = BTreeMap::new();
        let mut titles = BTreeMap::new();
        for course_id in summary.attendance_by_course.keys() {
            histories.insert(
                course_id.clone(),
                self.get_course_attendance(course_id, range).await?,
            );
            if let Some(course) = self.load_course(course_id).await? {
                titles.insert(course_id.clone(), course.title);
            }
        }
        let records = aggregate::student_records(&student_id, &histories, &titles);

        let (total_classes, attended) = if range.is_unbounded() {
            (summary.total_classes(), summary.attended())
        } else {
            let attended = records
                .iter()
                .filter(|r| r.status == AttendanceStatus::Present)
                .count() as u32;
            (records.len() as u32, attended)
        };

        Ok(StudentAttendanceReport {
            student_id,
            total_classes,
            attended,
            percentage: aggregate::percentage(attended, total_classes),
            courses: summary.attendance_by_course,
            records,
        })
    }

    pub async fn get_daily_stats(&self, course_id: &str, date: &str) -> AttendanceResult<DailyStats> {
        let attendance = self.get_attendance_by_date(course_id, date).await?;
        let course = self
            .load_course(&attendance.course_id)
            .await?
            .ok_or_else(|| {
                AttendanceError::NotFound(format!("course {} not found", attendance.course_id))
            })?;
        Ok(aggregate::compute_daily_stats(&attendance, course.roster_size()))
    }

    //=====================================================================================
    // Export
    //=====================================================================================

    /// Renders a student's filtered records. Fails with `EmptyResult` instead of
    /// producing an empty file.
    pub async fn export_student_attendance(
        &self,
        student_id: &str,
        filter: &RecordFilter,
        format: ExportFormat,
        generated_at: DateTime<Utc>,
    ) -> AttendanceResult<ExportFile> {
        let report = self
            .get_student_attendance_summary(student_id, DateRange::default())
            .await?;
        let records = aggregate::filter_records(&report.records, filter);
        if records.is_empty() {
            return Err(AttendanceError::EmptyResult(format!(
                "no attendance records for student {} match the selected filters",
                report.student_id
            )));
        }

        let rows = export::format_for_export(&records);
        let workbook = export::build_workbook(rows, &report.student_id, filter, generated_at);
        let bytes = match format {
            ExportFormat::Csv => export::to_csv(&workbook)?.into_bytes(),
            ExportFormat::Xlsx => export::to_xlsx(&workbook)?,
        };
        info!(
            "Exported {} attendance records for {} as {}",
            records.len(),
            report.student_id,
            format
        );
        Ok(ExportFile {
            filename: export::export_filename(&report.student_id, filter, format),
            content_type: format.content_type(),
            bytes,
        })
    }

    //=====================================================================================
    // Store helpers
    //=====================================================================================

    async fn load_attendance(&self, doc_id: &str) -> AttendanceResult<Option<AttendanceDate>> {
        match self.store.get(ATTENDANCE, doc_id).await? {
            Some(doc) => Ok(Some(schema::decode_attendance(&doc)?)),
            None => Ok(None),
        }
    }

    /// A job left behind for `doc_id`. An unreadable one is logged and treated as absent
    /// so that a fresh write can replace it.
    async fn load_pending_job(&self, doc_id: &str) -> AttendanceResult<Option<SummaryJob>> {
        let Some(doc) = self.store.get(SUMMARY_JOBS, doc_id).await? else {
            return Ok(None);
        };
        match schema::decode_job(&doc) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!("Replacing unreadable summary job {}: {}", doc_id, e);
                Ok(None)
            }
        }
    }

    async fn load_course(&self, course_id: &str) -> AttendanceResult<Option<Course>> {
        match self.store.get(COURSES, course_id).await? {
            Some(doc) => Ok(Some(schema::decode_course(&doc)?)),
            None => Ok(None),
        }
    }

    async fn load_summary(
        &self,
        student_id: &str,
    ) -> AttendanceResult<Option<StudentAttendanceSummary>> {
        match self.store.get(STUDENT_ATTENDANCE, student_id).await? {
            Some(doc) => Ok(Some(schema::decode_summary(&doc)?)),
            None => Ok(None),
        }
    }

    async fn save_summary(&self, summary: &StudentAttendanceSummary) -> AttendanceResult<()> {
        self.store
            .set(
                STUDENT_ATTENDANCE,
                &summary.student_id,
                schema::encode_summary(summary)?,
                None,
            )
            .await?;
        Ok(())
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
