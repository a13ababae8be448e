//! Google Gemini backend (Generative Language REST API).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    Generation, GenerationOptions, GenerationProvider, ProviderError, ProviderKind,
    ProviderSettings, HTTP_TIMEOUT,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
    #[serde(rename = "safetySettings")]
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Points the provider at a different API root (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: None,
        }
    }

    fn request_body<'a>(prompt: &'a str, options: &GenerationOptions) -> GeminiRequest<'a> {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
                max_output_tokens: options.max_output_tokens,
            },
            safety_settings: options
                .safety
                .iter()
                .map(|s| GeminiSafetySetting {
                    category: s.category.as_api_str(),
                    threshold: s.threshold.as_api_str(),
                })
                .collect(),
        }
    }

    /// The key travels in `x-goog-api-key` so it never appears in a URL.
    fn request(
        &self,
        api_key: &SecretString,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&Self::request_body(prompt, options))
    }

    fn interpret(response: GeminiResponse) -> Result<Generation, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::Api {
                provider: ProviderKind::Gemini,
                status: 200,
                message: error.message,
            });
        }

        let Some(candidate) = response.candidates.and_then(|c| c.into_iter().next()) else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked: {}", r))
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Ok(Generation::Empty { reason });
        };

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .map(|r| format!("empty candidate (finish reason {})", r))
                .unwrap_or_else(|| "empty candidate".to_string());
            return Ok(Generation::Empty { reason });
        }

        Ok(Generation::Text(text.to_string()))
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn initialize(&mut self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        let creds = settings
            .gemini
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: ProviderKind::Gemini,
                reason: "no API key stored or in GOOGLE_API_KEY".to_string(),
            })?;

        self.api_key = Some(creds.api_key.clone());
        self.model = Some(creds.model.clone());
        info!("Gemini provider ready (model {})", creds.model);
        Ok(())
    }

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError> {
        let (Some(api_key), Some(model)) = (self.api_key.as_ref(), self.model.as_deref()) else {
            return Err(ProviderError::NotInitialized {
                provider: ProviderKind::Gemini,
            });
        };

        debug!("Calling Gemini model {} ({} prompt chars)", model, prompt.len());

        let response = self
            .request(api_key, model, prompt, options)
            .send()
            .await
            .map_err(|e| ProviderError::http(ProviderKind::Gemini, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {}", status);
            return Err(ProviderError::Api {
                provider: ProviderKind::Gemini,
                status: status.as_u16(),
                message: crate::sanitize::preview(&body, 500),
            });
        }

        let parsed: GeminiResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: ProviderKind::Gemini,
                    reason: e.without_url().to_string(),
                })?;

        Self::interpret(parsed)
    }

    fn validate_configuration(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
            && self.model.as_deref().is_some_and(|m| !m.is_empty())
    }
}
