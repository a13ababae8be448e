//! Generation providers.
//!
//! A closed set of hosted LLM backends behind one text-in/text-out trait.
//! Both variants share [`GenerationOptions::default`] so a prompt tuned on
//! one behaves the same on the other.

pub mod azure;
pub mod error;
pub mod gemini;
pub mod registry;
pub mod settings;

pub use azure::AzureOpenAiProvider;
pub use error::ProviderError;
pub use gemini::GeminiProvider;
pub use registry::{build_provider, ProviderRegistry};
pub use settings::{AzureCredentials, GeminiCredentials, ProviderSettings};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

/// Per-request HTTP timeout for provider clients. The pipeline wraps each
/// call in its own, usually shorter, deadline.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Azure => "azure",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "azure" | "azure_openai" | "azure-openai" => Ok(ProviderKind::Azure),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmCategory {
    DangerousContent,
    HateSpeech,
    Harassment,
    SexuallyExplicit,
}

impl HarmCategory {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl BlockThreshold {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            BlockThreshold::BlockNone => "BLOCK_NONE",
            BlockThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            BlockThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            BlockThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

/// Sampling and safety parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Security content is the whole point, so dangerous-content blocking
    /// is off by default while the other categories stay guarded.
    pub safety: Vec<SafetySetting>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 2048,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            safety: vec![
                SafetySetting {
                    category: HarmCategory::DangerousContent,
                    threshold: BlockThreshold::BlockNone,
                },
                SafetySetting {
                    category: HarmCategory::HateSpeech,
                    threshold: BlockThreshold::BlockMediumAndAbove,
                },
                SafetySetting {
                    category: HarmCategory::Harassment,
                    threshold: BlockThreshold::BlockMediumAndAbove,
                },
                SafetySetting {
                    category: HarmCategory::SexuallyExplicit,
                    threshold: BlockThreshold::BlockMediumAndAbove,
                },
            ],
        }
    }
}

/// Result of a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Text(String),
    /// The backend answered but produced nothing usable (no candidates,
    /// safety block, empty completion).
    Empty { reason: String },
}

impl Generation {
    /// Text content, with `Empty` treated as an empty string.
    pub fn text(&self) -> &str {
        match self {
            Generation::Text(text) => text,
            Generation::Empty { .. } => "",
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Applies credentials and model settings. Idempotent; a failed call
    /// leaves the provider uninitialized and may simply be retried.
    async fn initialize(&mut self, settings: &ProviderSettings) -> Result<(), ProviderError>;

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError>;

    /// True once the provider holds everything needed to make a call.
    fn validate_configuration(&self) -> bool;
}
