//! Timeline import capability.
//!
//! The pipeline only needs "import this artifact into that collection";
//! [`TimesketchCli`] fulfils it by running the `timesketch` client as an
//! external process with an argument vector (never through a shell).

pub mod timesketch;

pub use timesketch::TimesketchCli;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::models::SourceKind;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("exit status {code}: {stderr}")]
    Failed { code: String, stderr: String },

    #[error("unexpected output: {0}")]
    InvalidOutput(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub collection_id: i64,
    pub artifact: PathBuf,
    /// Unique name of the timeline created by this import.
    pub timeline_name: String,
}

/// Diagnostics of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReceipt {
    pub output: String,
}

#[async_trait]
pub trait TimelineImporter: Send + Sync {
    async fn import(&self, request: &ImportRequest) -> Result<ImportReceipt, ImportError>;

    /// Creates a collection (sketch) and returns its id.
    async fn create_collection(&self, name: &str) -> Result<i64, ImportError>;
}

/// `{source}_{YYYYmmdd}_{8 hex}`, e.g. `evidence_20241016_1a2b3c4d`.
pub fn timeline_name(source: SourceKind) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        source.as_str(),
        Utc::now().format("%Y%m%d"),
        &id[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_name_shape() {
        let name = timeline_name(SourceKind::Evidence);
        let parts: Vec<&str> = name.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "evidence");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert_ne!(name, timeline_name(SourceKind::Evidence));
    }
}
