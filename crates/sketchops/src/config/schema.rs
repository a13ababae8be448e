use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::models::SourceKind;

pub const DEFAULT_CHAT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_EVIDENCE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CONFIG_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_OUTPUT_DIR: &str = "sketch_files";
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";
pub const DEFAULT_TIMESKETCH_BIN: &str = "timesketch";
pub const DEFAULT_MAX_BATCH_MESSAGES: usize = 200;

#[derive(Clone)]
pub struct ServiceConfig {
    /// Shared control-plane key, sent as `x-api-key` on evidence downloads.
    pub api_key: SecretString,
    pub database_path: PathBuf,
    /// Gemini key used until the operator stores one in the settings row.
    pub google_api_key: SecretString,

    /// Overrides the per-source default interval when set.
    pub poll_interval: Option<Duration>,
    pub config_wait: Duration,
    pub error_backoff: Duration,
    pub output_dir: PathBuf,
    pub generation_timeout: Duration,
    pub import_timeout: Duration,
    pub timesketch_bin: PathBuf,
    /// Evidence is downloaded from the API when set, else read from
    /// `uploads_dir`.
    pub api_url: Option<String>,
    pub uploads_dir: PathBuf,
    pub max_content_chars: usize,
    pub max_batch_messages: usize,
}

impl ServiceConfig {
    pub fn poll_interval_for(&self, source: SourceKind) -> Duration {
        self.poll_interval.unwrap_or(match source {
            SourceKind::Chat => DEFAULT_CHAT_INTERVAL,
            SourceKind::Evidence => DEFAULT_EVIDENCE_INTERVAL,
        })
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("database_path", &self.database_path)
            .field("poll_interval", &self.poll_interval)
            .field("output_dir", &self.output_dir)
            .field("timesketch_bin", &self.timesketch_bin)
            .field("api_url", &self.api_url)
            .field("uploads_dir", &self.uploads_dir)
            .finish_non_exhaustive()
    }
}
