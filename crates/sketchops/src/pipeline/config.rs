use std::path::PathBuf;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::provider::GenerationOptions;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 100_000;

pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub generation_timeout: Duration,
    /// Message or file content beyond this many characters is cut before
    /// it reaches the prompt.
    pub max_content_chars: usize,
    pub options: GenerationOptions,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
            options: GenerationOptions::default(),
        }
    }

    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            generation_timeout: config.generation_timeout,
            max_content_chars: config.max_content_chars,
            options: GenerationOptions::default(),
        }
    }
}
