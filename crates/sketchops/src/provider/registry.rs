//! Owns the active generation provider and rebuilds it when the operator
//! changes provider settings.
//!
//! Callers receive an `Arc` snapshot, so a refresh never swaps the
//! provider out from under an in-flight call; a switch takes effect on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{
    AzureOpenAiProvider, GeminiProvider, GenerationProvider, ProviderError, ProviderKind,
    ProviderSettings,
};
use crate::shutdown::Shutdown;

type ProviderFactory = Box<dyn Fn(ProviderKind) -> Box<dyn GenerationProvider> + Send + Sync>;

/// Builds an uninitialized provider for `kind`.
pub fn build_provider(kind: ProviderKind) -> Box<dyn GenerationProvider> {
    match kind {
        ProviderKind::Gemini => Box::new(GeminiProvider::new()),
        ProviderKind::Azure => Box::new(AzureOpenAiProvider::new()),
    }
}

pub struct ProviderRegistry {
    factory: ProviderFactory,
    active: Option<Arc<dyn GenerationProvider>>,
    fingerprint: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_factory(build_provider)
    }

    /// Registry with a custom constructor, used to inject fakes.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(ProviderKind) -> Box<dyn GenerationProvider> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            active: None,
            fingerprint: None,
        }
    }

    pub fn current(&self) -> Option<Arc<dyn GenerationProvider>> {
        self.active.clone()
    }

    /// Returns a ready provider for `settings`, rebuilding only when the
    /// settings fingerprint changed or the current provider is not ready.
    pub async fn refresh(
        &mut self,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        let fingerprint = settings.fingerprint();

        if let Some(active) = &self.active {
            if self.fingerprint.as_deref() == Some(fingerprint.as_str())
                && active.validate_configuration()
            {
                return Ok(Arc::clone(active));
            }
        }

        match self.build(settings).await {
            Ok(provider) => {
                let previous = self.active.as_ref().map(|p| p.kind());
                match previous {
                    Some(kind) if kind != provider.kind() => {
                        info!("Switched generation provider {} -> {}", kind, provider.kind())
                    }
                    Some(_) => info!("Reloaded {} provider settings", provider.kind()),
                    None => info!("Initialized {} provider", provider.kind()),
                }
                self.active = Some(Arc::clone(&provider));
                self.fingerprint = Some(fingerprint);
                Ok(provider)
            }
            Err(e) => {
                if self
                    .active
                    .as_ref()
                    .is_some_and(|p| p.kind() != settings.active)
                {
                    warn!("Dropping previous provider after failed switch to {}", settings.active);
                    self.active = None;
                    self.fingerprint = None;
                }
                Err(e)
            }
        }
    }

    async fn build(
        &self,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        if !settings.is_complete() {
            return Err(ProviderError::NotConfigured {
                provider: settings.active,
                reason: "credentials missing or incomplete".to_string(),
            });
        }
        let mut provider = (self.factory)(settings.active);
        provider.initialize(settings).await?;
        Ok(Arc::from(provider))
    }

    /// Polls `load` until a provider initializes, sleeping `interval`
    /// between attempts. `max_retries: None` waits indefinitely; shutdown
    /// ends the wait early.
    pub async fn wait_for_configuration<F>(
        &mut self,
        mut load: F,
        max_retries: Option<u32>,
        interval: Duration,
        shutdown: &Shutdown,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError>
    where
        F: FnMut() -> Result<ProviderSettings, ProviderError>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let last_error = match load() {
                Ok(settings) => match self.refresh(&settings).await {
                    Ok(provider) => return Ok(provider),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if max_retries.is_some_and(|max| attempt > max) {
                return Err(last_error);
            }

            info!(
                "Waiting for provider configuration (attempt {}): {}",
                attempt, last_error
            );
            if !shutdown.sleep(interval).await {
                return Err(last_error);
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GeminiCredentials, Generation, GenerationOptions};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        kind: ProviderKind,
        ready: bool,
        inits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerationProvider for CountingProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn initialize(&mut self, _settings: &ProviderSettings) -> Result<(), ProviderError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            self.ready = true;
            Ok(())
        }

        async fn generate_content(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<Generation, ProviderError> {
            Ok(Generation::Text("{}".into()))
        }

        fn validate_configuration(&self) -> bool {
            self.ready
        }
    }

    fn registry(inits: Arc<AtomicUsize>) -> ProviderRegistry {
        ProviderRegistry::with_factory(move |kind| {
            Box::new(CountingProvider {
                kind,
                ready: false,
                inits: Arc::clone(&inits),
            })
        })
    }

    fn gemini(key: &str) -> ProviderSettings {
        ProviderSettings {
            active: ProviderKind::Gemini,
            gemini: Some(GeminiCredentials {
                api_key: SecretString::from(key),
                model: "m".into(),
            }),
            azure: None,
        }
    }

    fn azure_incomplete() -> ProviderSettings {
        ProviderSettings {
            active: ProviderKind::Azure,
            gemini: None,
            azure: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_reuses_provider_for_same_settings() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut reg = registry(Arc::clone(&inits));

        let a = reg.refresh(&gemini("k")).await.unwrap();
        let b = reg.refresh(&gemini("k")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        reg.refresh(&gemini("rotated")).await.unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_switch_drops_old_provider() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut reg = registry(inits);

        let held = reg.refresh(&gemini("k")).await.unwrap();
        assert!(reg.refresh(&azure_incomplete()).await.is_err());
        assert!(reg.current().is_none());
        // A snapshot taken before the switch stays usable.
        assert!(held.validate_configuration());
    }

    #[tokio::test]
    async fn test_wait_for_configuration_retries_until_ready() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut reg = registry(inits);
        let shutdown = Shutdown::new();

        let mut calls = 0;
        let provider = reg
            .wait_for_configuration(
                || {
                    calls += 1;
                    if calls < 3 {
                        Ok(azure_incomplete())
                    } else {
                        Ok(gemini("k"))
                    }
                },
                None,
                Duration::from_millis(1),
                &shutdown,
            )
            .await
            .unwrap();
        assert_eq!(provider.kind(), ProviderKind::Gemini);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_wait_for_configuration_gives_up() {
        let mut reg = registry(Arc::new(AtomicUsize::new(0)));
        let shutdown = Shutdown::new();
        let mut calls = 0;
        let result = reg
            .wait_for_configuration(
                || {
                    calls += 1;
                    Ok(azure_incomplete())
                },
                Some(2),
                Duration::from_millis(1),
                &shutdown,
            )
            .await;
        assert!(matches!(result, Err(ProviderError::NotConfigured { .. })));
        assert_eq!(calls, 3);
    }
}
