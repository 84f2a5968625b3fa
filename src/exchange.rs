//! JSON interchange format for bulk import and export.

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReminderChainError, Result};
use crate::reminders::Reminder;

const EXPORT_FILE_PREFIX: &str = "Reminders ";
const EXPORT_FILE_EXTENSION: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportRecord {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "date_time", alias = "due_at", alias = "dueAt")]
    pub due_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub date_time: i64,
    pub notified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImport {
    pub records: Vec<ImportRecord>,
    /// Records that were present but malformed.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Parses an import payload.
///
/// A payload that is not a JSON array fails as a whole with
/// `ImportFormat`; malformed elements inside a valid array are skipped
/// and counted.
pub fn parse_import(payload: &str) -> Result<ParsedImport> {
    let items: Vec<Value> = serde_json::from_str(payload)
        .map_err(|e| ReminderChainError::ImportFormat(e.to_string()))?;

    let mut parsed = ParsedImport::default();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ImportRecord>(item) {
            Ok(record) => parsed.records.push(record),
            Err(err) => {
                tracing::debug!(index, error = %err, "Skipping malformed import record");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}

pub fn render_export(reminders: &[Reminder]) -> Result<String> {
    let records: Vec<ExportRecord<'_>> = reminders
        .iter()
        .map(|reminder| ExportRecord {
            title: &reminder.title,
            body: &reminder.body,
            date_time: reminder.due_at,
            notified: reminder.notified,
        })
        .collect();
    serde_json::to_string_pretty(&records)
        .map_err(|e| ReminderChainError::Serialization(e.to_string()))
}

/// `Reminders YYYYMMDD.json`, dated in local time.
pub fn export_file_name(now_ms: i64) -> String {
    let date = Local
        .timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Local::now);
    format!(
        "{EXPORT_FILE_PREFIX}{}{EXPORT_FILE_EXTENSION}",
        date.format("%Y%m%d")
    )
}
