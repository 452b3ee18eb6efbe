pub mod aggregate;
pub mod domain;
pub mod error;
pub mod export;
pub mod memory;
pub mod ports;
pub mod records;
pub mod schema;
pub mod validation;

pub use domain::{
    AttendanceDate, AttendanceRecord, AttendanceStatus, Course, CourseAttendance, DailyStats,
    DateRange, Page, RecordFilter, StudentAttendanceReport, StudentAttendanceSummary, SummaryJob,
};
pub use error::{AttendanceError, AttendanceResult};
pub use export::{ExportFile, ExportFormat, ExportRow};
pub use memory::MemoryDocumentStore;
pub use ports::{DocumentStore, Filter, FilterOp, PortError, PortResult, StoredDocument};
pub use records::{AttendanceService, MarkAttendance};
