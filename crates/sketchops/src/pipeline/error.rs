use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::db::DatabaseError;
use crate::evidence::EvidenceError;
use crate::importer::ImportError;
use crate::prompt::PromptError;
use crate::provider::ProviderError;

/// Errors that end a pipeline run.
///
/// Every variant except `Database` is a unit-scoped failure whose display
/// text becomes the recorded `processing_error`. `Database` means the
/// outcome could not be committed and is returned to the tick.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("no valid records: forced batch produced no JSON lines")]
    NoRecords,

    #[error("artifact write error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PipelineError {
    pub fn is_unit_failure(&self) -> bool {
        !matches!(self, PipelineError::Database(_))
    }
}
