//! CSV export of the filtered visit view.
//!
//! One row per visit, newest first, with a fixed 19-column header. Fields
//! containing a comma, quote or newline are quoted with embedded quotes
//! doubled. The whole document is built in memory so a failed export never
//! leaves a partial file behind.

use chrono::{DateTime, SecondsFormat};
use csv::Writer;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dashboard::QueryError;
use crate::models::VisitRecord;
use crate::storage::{SortOrder, Storage, VisitFilter};

pub const HEADER: [&str; 19] = [
    "ID",
    "URL",
    "Bot name",
    "IP",
    "Timestamp",
    "Referrer",
    "Page title",
    "User agent",
    "Country",
    "City",
    "Session ID",
    "Visited pages",
    "Is anomaly",
    "Anomaly reason",
    "Anomaly score",
    "Is blocked",
    "Bot category",
    "Page load time (s)",
    "Server response time (s)",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no visits match the current filters")]
    Empty,
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// ISO 8601 in UTC with milliseconds, e.g. `2024-01-15T23:59:00.000Z`
pub fn iso_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn record_fields(record: &VisitRecord) -> [String; 19] {
    [
        record.id.to_string(),
        record.url.clone(),
        opt(&record.bot_name),
        record.ip.clone(),
        iso_timestamp(record.timestamp),
        opt(&record.referrer),
        opt(&record.page_title),
        record.user_agent.clone(),
        opt(&record.country),
        opt(&record.city),
        opt(&record.session_id),
        record.visited_pages.join(", "),
        record.is_anomaly.to_string(),
        record.anomaly_reasons.join(", "),
        opt(&record.anomaly_score),
        record.is_blocked.to_string(),
        record.bot_category.to_string(),
        opt(&record.page_load_time),
        opt(&record.server_response_time),
    ]
}

/// Write header and rows to `out`; returns the number of rows written
pub fn write_csv<W: Write>(records: &[VisitRecord], out: W) -> Result<usize, ExportError> {
    let mut writer = Writer::from_writer(out);
    writer.write_record(HEADER)?;
    for record in records {
        writer.write_record(record_fields(record))?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Complete CSV document for `records`; an empty selection is an error
pub fn render_csv(records: &[VisitRecord]) -> Result<Vec<u8>, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty);
    }
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    Ok(buffer)
}

/// CSV of every visit matching `filter`, newest first, with its row count
pub async fn export_visits(
    storage: &dyn Storage,
    filter: &VisitFilter,
) -> Result<(Vec<u8>, usize), ExportError> {
    let records = storage
        .scan_visits(filter, SortOrder::Desc)
        .await
        .map_err(QueryError::from)?;
    let document = render_csv(&records)?;
    Ok((document, records.len()))
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

/// Write `document` next to `path` and rename it into place once complete
pub fn write_file(path: &Path, document: &[u8]) -> Result<(), ExportError> {
    let partial = partial_path(path);
    let result = fs::File::create(&partial)
        .and_then(|mut file| {
            file.write_all(document)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&partial, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BotCategory, NewVisit};

    fn record() -> VisitRecord {
        NewVisit {
            url: "/search?q=a,b".to_string(),
            bot_name: Some("Googlebot".to_string()),
            user_agent: "Mozilla/5.0 (compatible; Googlebot/2.1)".to_string(),
            ip: "66.249.66.1".to_string(),
            // 2024-01-15T23:59:00Z
            timestamp: 1_705_363_140_000,
            page_title: Some("Say \"hi\"".to_string()),
            visited_pages: vec!["/a".to_string(), "/b".to_string()],
            anomaly_reasons: vec!["burst".to_string()],
            anomaly_score: Some(42),
            bot_category: BotCategory::Monitored,
            page_load_time: Some(1.5),
            ..Default::default()
        }
        .into_record(7)
    }

    #[test]
    fn test_header_and_row_layout() {
        let document = render_csv(&[record()]).unwrap();
        let mut reader = csv::Reader::from_reader(document.as_slice());

        let header: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(header, HEADER);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 19);
        assert_eq!(&row[0], "7");
        assert_eq!(&row[4], "2024-01-15T23:59:00.000Z");
        assert_eq!(&row[5], "");
        assert_eq!(&row[11], "/a, /b");
        assert_eq!(&row[12], "false");
        assert_eq!(&row[14], "42");
        assert_eq!(&row[16], "monitored");
        assert_eq!(&row[17], "1.5");
        assert_eq!(&row[18], "");
    }

    #[test]
    fn test_comma_and_quote_fields_round_trip() {
        let document = render_csv(&[record()]).unwrap();
        let text = String::from_utf8(document.clone()).unwrap();
        assert!(text.contains("\"/search?q=a,b\""));
        assert!(text.contains("\"Say \"\"hi\"\"\""));

        let mut reader = csv::Reader::from_reader(document.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "/search?q=a,b");
        assert_eq!(&row[6], "Say \"hi\"");
    }

    #[test]
    fn test_empty_selection_is_an_error() {
        assert!(matches!(render_csv(&[]), Err(ExportError::Empty)));
    }

    #[test]
    fn test_write_file_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_logs.csv");

        write_file(&path, b"ID\n1\n").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"ID\n1\n");
        assert!(!partial_path(&path).exists());
    }
}
