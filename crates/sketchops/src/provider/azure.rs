//! Azure OpenAI backend (chat completions against a named deployment).
//!
//! Azure applies its own content filtering server-side, so the safety
//! thresholds in [`GenerationOptions`] have no request-level counterpart
//! here; a filtered completion comes back as [`Generation::Empty`].

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    AzureCredentials, Generation, GenerationOptions, GenerationProvider, ProviderError,
    ProviderKind, ProviderSettings, HTTP_TIMEOUT,
};

const SYSTEM_PROMPT: &str = "You are a security analysis assistant. You analyze content and provide detailed security insights in JSON format.";

pub struct AzureOpenAiProvider {
    client: Client,
    creds: Option<AzureCredentials>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl AzureOpenAiProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            creds: None,
        }
    }

    fn completions_url(creds: &AzureCredentials) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            creds.endpoint, creds.deployment, creds.api_version
        )
    }

    async fn complete(
        &self,
        creds: &AzureCredentials,
        request: &ChatRequest<'_>,
    ) -> Result<Generation, ProviderError> {
        let response = self
            .client
            .post(Self::completions_url(creds))
            .header("api-key", creds.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::http(ProviderKind::Azure, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Azure OpenAI returned {}", status);
            return Err(ProviderError::Api {
                provider: ProviderKind::Azure,
                status: status.as_u16(),
                message: crate::sanitize::preview(&body, 500),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: ProviderKind::Azure,
                    reason: e.without_url().to_string(),
                })?;

        Ok(Self::interpret(parsed))
    }

    fn interpret(response: ChatResponse) -> Generation {
        let Some(choice) = response.choices.into_iter().next() else {
            return Generation::Empty {
                reason: "no choices returned".to_string(),
            };
        };

        let text = choice
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            Generation::Empty {
                reason: format!(
                    "empty completion (finish reason {})",
                    choice.finish_reason.as_deref().unwrap_or("unknown")
                ),
            }
        } else {
            Generation::Text(text)
        }
    }
}

impl Default for AzureOpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for AzureOpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    /// Validates the credential bundle with a 5-token probe completion
    /// before adopting it.
    async fn initialize(&mut self, settings: &ProviderSettings) -> Result<(), ProviderError> {
        let creds = settings
            .azure
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: ProviderKind::Azure,
                reason: "api_key, api_version, endpoint and deployment are all required"
                    .to_string(),
            })?;

        info!("Testing Azure configuration with deployment {}", creds.deployment);
        let probe = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: "test",
            }],
            temperature: 0.0,
            max_tokens: 5,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };
        self.complete(creds, &probe).await?;

        self.creds = Some(creds.clone());
        info!("Azure OpenAI provider ready");
        Ok(())
    }

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ProviderError> {
        let creds = self.creds.as_ref().ok_or(ProviderError::NotInitialized {
            provider: ProviderKind::Azure,
        })?;

        debug!(
            "Calling Azure deployment {} ({} prompt chars)",
            creds.deployment,
            prompt.len()
        );

        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
        };

        self.complete(creds, &request).await
    }

    fn validate_configuration(&self) -> bool {
        self.creds.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn creds() -> AzureCredentials {
        AzureCredentials {
            api_key: SecretString::from("k"),
            api_version: "2024-02-01".into(),
            endpoint: "https://x.openai.azure.com".into(),
            deployment: "gpt-4o".into(),
        }
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            AzureOpenAiProvider::completions_url(&creds()),
            "https://x.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_interpret_text_and_filtered() {
        let text: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" {\"a\":1} "},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(
            AzureOpenAiProvider::interpret(text),
            Generation::Text("{\"a\":1}".into())
        );

        let filtered: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#,
        )
        .unwrap();
        assert_eq!(
            AzureOpenAiProvider::interpret(filtered),
            Generation::Empty {
                reason: "empty completion (finish reason content_filter)".into()
            }
        );
    }

    #[test]
    fn test_request_uses_shared_defaults() {
        let opts = GenerationOptions::default();
        let req = ChatRequest {
            messages: vec![],
            temperature: opts.temperature,
            max_tokens: opts.max_output_tokens,
            top_p: opts.top_p,
            frequency_penalty: opts.frequency_penalty,
            presence_penalty: opts.presence_penalty,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["presence_penalty"], 0.0);
    }

    #[tokio::test]
    async fn test_initialize_without_creds_leaves_provider_unready() {
        let mut provider = AzureOpenAiProvider::new();
        let settings = ProviderSettings {
            active: ProviderKind::Azure,
            gemini: None,
            azure: None,
        };
        assert!(matches!(
            provider.initialize(&settings).await,
            Err(ProviderError::NotConfigured { .. })
        ));
        assert!(!provider.validate_configuration());
    }
}
