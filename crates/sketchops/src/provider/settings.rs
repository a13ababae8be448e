//! Provider configuration parsed from the operator settings row.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{ProviderError, ProviderKind};
use crate::db::settings_repo::PlatformSettingsRow;
use crate::sanitize;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-002";

#[derive(Clone)]
pub struct GeminiCredentials {
    pub api_key: SecretString,
    pub model: String,
}

#[derive(Clone)]
pub struct AzureCredentials {
    pub api_key: SecretString,
    pub api_version: String,
    pub endpoint: String,
    pub deployment: String,
}

/// Snapshot of which provider to use and with what credentials.
///
/// Parsed fresh on every tick; the registry compares fingerprints to decide
/// whether the active provider must be rebuilt.
#[derive(Clone)]
pub struct ProviderSettings {
    pub active: ProviderKind,
    pub gemini: Option<GeminiCredentials>,
    pub azure: Option<AzureCredentials>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("active", &self.active)
            .field("gemini", &self.gemini.as_ref().map(|g| g.model.as_str()))
            .field("azure", &self.azure.as_ref().map(|a| a.deployment.as_str()))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProviderKeysDoc {
    #[serde(default)]
    gemini: Option<GeminiKeyDoc>,
    #[serde(default)]
    azure: Option<AzureKeysDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiKeyDoc {
    Plain(String),
    Object { api_key: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct AzureKeysDoc {
    api_key: Option<String>,
    api_version: Option<String>,
    endpoint: Option<String>,
    deployment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelSettingsDoc {
    model_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_json<T: Default + for<'de> Deserialize<'de>>(
    raw: Option<&str>,
    column: &str,
) -> Result<T, ProviderError> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(T::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ProviderError::InvalidSettings(format!("{}: {}", column, e))),
    }
}

impl ProviderSettings {
    /// Builds settings from the stored row. `fallback_gemini_key` (the
    /// process-level `GOOGLE_API_KEY`) is used when no Gemini key is stored.
    pub fn from_row(
        row: Option<&PlatformSettingsRow>,
        fallback_gemini_key: Option<&SecretString>,
    ) -> Result<Self, ProviderError> {
        let active = match row
            .and_then(|r| r.ai_provider.as_deref())
            .filter(|p| !p.trim().is_empty())
        {
            Some(name) => name.parse()?,
            None => ProviderKind::Gemini,
        };

        let keys: ProviderKeysDoc =
            parse_json(row.and_then(|r| r.ai_provider_keys.as_deref()), "ai_provider_keys")?;
        let model: ModelSettingsDoc = parse_json(
            row.and_then(|r| r.ai_model_settings.as_deref()),
            "ai_model_settings",
        )?;

        let stored_gemini_key = match keys.gemini {
            Some(GeminiKeyDoc::Plain(key)) => non_empty(Some(key)),
            Some(GeminiKeyDoc::Object { api_key }) => non_empty(api_key),
            None => None,
        };
        let gemini_key = stored_gemini_key.map(SecretString::from).or_else(|| {
            fallback_gemini_key
                .filter(|k| !k.expose_secret().trim().is_empty())
                .cloned()
        });
        let gemini = gemini_key.map(|api_key| GeminiCredentials {
            api_key,
            model: non_empty(model.model_name.clone())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        });

        let azure = keys.azure.and_then(|doc| {
            Some(AzureCredentials {
                api_key: SecretString::from(non_empty(doc.api_key)?),
                api_version: non_empty(doc.api_version)?,
                endpoint: non_empty(doc.endpoint)?.trim_end_matches('/').to_string(),
                deployment: non_empty(doc.deployment)?,
            })
        });

        Ok(Self {
            active,
            gemini,
            azure,
        })
    }

    /// Whether the active provider has a complete credential bundle.
    pub fn is_complete(&self) -> bool {
        match self.active {
            ProviderKind::Gemini => self.gemini.is_some(),
            ProviderKind::Azure => self.azure.is_some(),
        }
    }

    /// Stable hash of everything that affects the active provider.
    pub fn fingerprint(&self) -> String {
        let material = match self.active {
            ProviderKind::Gemini => self
                .gemini
                .as_ref()
                .map(|g| format!("gemini|{}|{}", g.model, g.api_key.expose_secret())),
            ProviderKind::Azure => self.azure.as_ref().map(|a| {
                format!(
                    "azure|{}|{}|{}|{}",
                    a.endpoint,
                    a.deployment,
                    a.api_version,
                    a.api_key.expose_secret()
                )
            }),
        };
        sanitize::fingerprint(&(self.active.as_str(), material))
    }
}
