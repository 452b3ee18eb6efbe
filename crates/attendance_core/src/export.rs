//! crates/attendance_core/src/export.rs
//!
//! Tabular rendering of a student's filtered attendance records for download.
//! Rows always carry the columns Date, Course, Status, Marked By, Timestamp in that
//! order. CSV output puts the export metadata in `#` comment lines ahead of the
//! header; XLSX output carries it on a separate sheet and in the document properties.

use crate::domain::{AttendanceRecord, RecordFilter};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};
use std::str::FromStr;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const EXPORT_COLUMNS: [&str; 5] = ["Date", "Course", "Status", "Marked By", "Timestamp"];

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => CSV_CONTENT_TYPE,
            ExportFormat::Xlsx => XLSX_CONTENT_TYPE,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(AttendanceError::Validation(format!(
                "format must be csv or xlsx, got '{}'",
                other
            ))),
        }
    }
}

/// One output row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Course")]
    pub course: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Marked By")]
    pub marked_by: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl ExportRow {
    fn cells(&self) -> [&str; 5] {
        [&self.date, &self.course, &self.status, &self.marked_by, &self.timestamp]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheet_name: String,
    pub rows: Vec<ExportRow>,
    /// Ordered key/value pairs describing the export.
    pub metadata: Vec<(String, String)>,
    pub student_id: String,
    pub generated_at: DateTime<Utc>,
}

/// A rendered download.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn format_for_export(records: &[AttendanceRecord]) -> Vec<ExportRow> {
    records
        .iter()
        .map(|r| ExportRow {
            date: r.date.format("%Y-%m-%d").to_string(),
            course: r.course_title.clone().unwrap_or_else(|| r.course_id.clone()),
            status: r.status.as_str().to_string(),
            marked_by: if r.marked_by_name.trim().is_empty() {
                r.marked_by.clone()
            } else {
                r.marked_by_name.clone()
            },
            timestamp: r.marked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
        .collect()
}

fn describe(value: Option<String>) -> String {
    value.unwrap_or_else(|| "any".to_string())
}

pub fn build_workbook(
    rows: Vec<ExportRow>,
    student_id: &str,
    filter: &RecordFilter,
    generated_at: DateTime<Utc>,
) -> Workbook {
    let metadata = vec![
        ("Student".to_string(), student_id.to_string()),
        (
            "Generated At".to_string(),
            generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("Start Date".to_string(), describe(filter.range.start.map(|d| d.to_string()))),
        ("End Date".to_string(), describe(filter.range.end.map(|d| d.to_string()))),
        ("Course".to_string(), describe(filter.course_id.clone())),
        ("Status".to_string(), describe(filter.status.map(|s| s.to_string()))),
        ("Records".to_string(), rows.len().to_string()),
    ];
    Workbook {
        sheet_name: "Attendance".to_string(),
        rows,
        metadata,
        student_id: student_id.to_string(),
        generated_at,
    }
}

//=========================================================================================
// CSV
//=========================================================================================

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

pub fn to_csv(workbook: &Workbook) -> AttendanceResult<String> {
    let mut out = String::from("# Attendance Export\n");
    for (key, value) in &workbook.metadata {
        out.push_str(&format!("# {}: {}\n", single_line(key), single_line(value)));
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;
    for row in &workbook.rows {
        writer.serialize(row)?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AttendanceError::Export(e.to_string()))?;
    let body = String::from_utf8(body).map_err(|e| AttendanceError::Export(e.to_string()))?;
    out.push_str(&body);
    Ok(out)
}

/// Reads rows back out of `to_csv` output, skipping the metadata comment lines.
pub fn parse_csv(text: &str) -> AttendanceResult<Vec<ExportRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.iter().ne(EXPORT_COLUMNS) {
        return Err(AttendanceError::Export(format!(
            "unexpected header row: {:?}",
            headers.iter().collect::<Vec<_>>()
        )));
    }
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

//=========================================================================================
// XLSX
//=========================================================================================

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

/// 0 -> "A", 25 -> "Z", 26 -> "AA".
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn sheet_xml<'a, R, C>(rows: R) -> String
where
    R: IntoIterator<Item = C>,
    C: IntoIterator<Item = &'a str>,
{
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );
    for (r, cells) in rows.into_iter().enumerate() {
        let row_number = r + 1;
        xml.push_str(&format!("<row r=\"{}\">", row_number));
        for (c, value) in cells.into_iter().enumerate() {
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letter(c),
                row_number,
                xml_escape(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

pub const INFO_SHEET_NAME: &str = "Export Info";

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>\
         <sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/><sheet name=\"{}\" sheetId=\"2\" r:id=\"rId2\"/>\
         </sheets></workbook>",
        xml_escape(sheet_name),
        INFO_SHEET_NAME
    )
}

fn core_properties_xml(workbook: &Workbook) -> String {
    let description = workbook
        .metadata
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <dc:title>{}</dc:title><dc:description>{}</dc:description><dc:creator>attendance-api</dc:creator>\
         <dcterms:created xsi:type=\"dcterms:W3CDTF\">{}</dcterms:created></cp:coreProperties>",
        xml_escape(&format!("Attendance export for {}", workbook.student_id)),
        xml_escape(&description),
        workbook.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub fn to_xlsx(workbook: &Workbook) -> AttendanceResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let data_sheet = sheet_xml(
        std::iter::once(EXPORT_COLUMNS.to_vec())
            .chain(workbook.rows.iter().map(|row| row.cells().to_vec())),
    );
    let info_sheet = sheet_xml(
        workbook
            .metadata
            .iter()
            .map(|(k, v)| vec![k.as_str(), v.as_str()]),
    );

    let parts: [(&str, String); 8] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("docProps/core.xml", core_properties_xml(workbook)),
        ("xl/workbook.xml", workbook_xml(&workbook.sheet_name)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/styles.xml", STYLES_XML.to_string()),
        ("xl/worksheets/sheet1.xml", data_sheet),
        ("xl/worksheets/sheet2.xml", info_sheet),
    ];
    for (name, content) in parts {
        zip.start_file(name, opts)?;
        zip.write_all(content.as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

//=========================================================================================
// Filenames
//=========================================================================================

fn filename_part(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// The same student and filters always produce the same name.
pub fn export_filename(student_id: &str, filter: &RecordFilter, format: ExportFormat) -> String {
    let mut parts = vec![
        "attendance".to_string(),
        filename_part(student_id),
        filter
            .range
            .start
            .map_or_else(|| "start".to_string(), |d| d.to_string()),
        filter
            .range
            .end
            .map_or_else(|| "end".to_string(), |d| d.to_string()),
    ];
    if let Some(course_id) = &filter.course_id {
        parts.push(filename_part(course_id));
    }
    if let Some(status) = filter.status {
        parts.push(status.to_string());
    }
    format!("{}.{}", parts.join("_"), format.extension())
}
