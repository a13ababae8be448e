use thiserror::Error;

#[derive(Error, Debug)]
pub enum SketchopsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] crate::artifact::ArtifactError),

    #[error("Import error: {0}")]
    Import(#[from] crate::importer::ImportError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Poll error: {0}")]
    Poll(#[from] crate::poller::PollError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, SketchopsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_every_name() {
        let e = ConfigError::Missing(vec!["API_KEY", "GOOGLE_API_KEY"]);
        assert_eq!(
            e.to_string(),
            "missing required environment variables: API_KEY, GOOGLE_API_KEY"
        );
    }
}
