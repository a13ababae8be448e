//! Generation artifacts: line-delimited JSON files handed to the importer.
//!
//! An artifact is created exclusively (never overwritten), deleted after a
//! successful import, and left on disk when import fails so an operator can
//! re-run the import by hand.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::filter::ValidatedLine;
use crate::models::SourceKind;
use crate::sanitize;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to write an empty artifact")]
    Empty,

    #[error("line {line} of '{path}' is not a JSON object")]
    InvalidLine { path: PathBuf, line: usize },
}

/// Keeps only `[A-Za-z0-9_-]` so origin or unit labels cannot introduce
/// path separators.
fn file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unit".to_string()
    } else {
        cleaned
    }
}

/// `{source}_{collection}_{unit}_{YYYYmmdd_HHMMSS}_{8 hex}.jsonl`
pub fn artifact_file_name(source: SourceKind, collection_id: i64, unit: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}_{}.jsonl",
        source.as_str(),
        collection_id,
        file_component(unit),
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8]
    )
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `lines` to a new uniquely named file and returns its path.
    ///
    /// Records are separated by `\n` with no trailing separator. The file is
    /// synced before returning so a crash cannot leave a torn artifact that
    /// looks complete.
    pub fn write(
        &self,
        source: SourceKind,
        collection_id: i64,
        unit: &str,
        lines: &[ValidatedLine],
    ) -> Result<PathBuf, ArtifactError> {
        if lines.is_empty() {
            return Err(ArtifactError::Empty);
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| ArtifactError::CreateDirectory {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self
            .dir
            .join(artifact_file_name(source, collection_id, unit));
        let write_err = |e| ArtifactError::Write {
            path: path.clone(),
            source: e,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(write_err)?;

        let body = lines
            .iter()
            .map(ValidatedLine::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        file.write_all(body.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        debug!(
            "Wrote {} records to {}",
            lines.len(),
            sanitize::redact_path(&path)
        );
        Ok(path)
    }

    /// Deletes an artifact after a successful import.
    pub fn remove(&self, path: &Path) -> Result<(), ArtifactError> {
        std::fs::remove_file(path).map_err(|e| ArtifactError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Re-reads an artifact and checks that every line is a JSON object.
/// Returns the number of records.
pub fn verify(path: &Path) -> Result<usize, ArtifactError> {
    let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut count = 0;
    for (idx, line) in content.split('\n').enumerate() {
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(_)) => count += 1,
            _ => {
                return Err(ArtifactError::InvalidLine {
                    path: path.to_path_buf(),
                    line: idx + 1,
                })
            }
        }
    }
    Ok(count)
}
