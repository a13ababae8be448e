//! Domain types shared by the selector, pipeline and repositories.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Which ingestion source a poller is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Chat,
    Evidence,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Chat => "chat",
            SourceKind::Evidence => "evidence",
        }
    }

    /// Component name attached to every log line of the poller.
    pub fn component(&self) -> &'static str {
        match self {
            SourceKind::Chat => "ChatOperator",
            SourceKind::Evidence => "EvidenceProcessor",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat room (or upload context) feeding one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub id: i64,
    pub name: String,
    pub active: bool,
    /// Timesketch sketch id; origins without one are skipped.
    pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub origin_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: String,
    pub force_process: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: i64,
    pub origin_id: i64,
    /// Per-file sketch override; falls back to the origin's collection.
    pub collection_id: Option<i64>,
    pub filename: String,
    pub stored_path: String,
    pub content_type: Option<String>,
    pub uploader_username: Option<String>,
    pub uploader_team: Option<String>,
}

impl UploadedFile {
    /// Reporter identity as `username@team`, with `sketch` as the default team.
    pub fn uploader(&self) -> String {
        format!(
            "{}@{}",
            self.uploader_username.as_deref().unwrap_or("unknown"),
            self.uploader_team
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or("sketch")
        )
    }

    /// Declared content type, or a guess from the file extension.
    pub fn effective_type(&self) -> String {
        if let Some(declared) = self.content_type.as_deref().filter(|t| !t.is_empty()) {
            return declared.to_string();
        }
        let ext = std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("tsv") | Some("txt") | Some("log") | Some("json") => {
                ext.unwrap_or_default()
            }
            _ => mime_guess::from_path(&self.filename)
                .first_raw()
                .unwrap_or("text/plain")
                .to_string(),
        }
    }
}

/// Terminal outcome recorded against a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Imported,
    NoRelevantContent,
    Failed(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Imported => "imported",
            Outcome::NoRelevantContent => "no_content",
            Outcome::Failed(_) => "failed",
        }
    }

    /// Successful outcomes advance the origin's cursor.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

pub const NO_RELEVANT_CONTENT: &str = "no relevant content";

/// Canonical stored form: RFC 3339, UTC, fixed microsecond precision, so
/// that lexical and chronological order agree.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Naive layouts the platform may write, read as UTC. `%.f` also matches
/// a missing fraction.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses RFC 3339 text as well as SQLite's `CURRENT_TIMESTAMP` style
/// (`YYYY-MM-DD HH:MM:SS[.fff]`, taken as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .map(|naive| naive.and_utc())
}
