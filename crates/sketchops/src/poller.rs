//! The long-running poll loop, one per source.
//!
//! A tick reloads the operator settings, makes sure a provider is ready,
//! selects pending work and runs it through the pipeline one origin at a
//! time. Missing configuration pauses the tick; errors and panics become a
//! backoff sleep. Only the shutdown signal ends [`Poller::run`].

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::ServiceConfig;
use crate::db::{settings_repo, Database, DatabaseError};
use crate::models::{Outcome, SourceKind};
use crate::pipeline::{BatchReport, Pipeline, PipelineError};
use crate::provider::{GenerationProvider, ProviderError, ProviderRegistry, ProviderSettings};
use crate::selector;
use crate::shutdown::Shutdown;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Why a tick did no work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseReason {
    MissingPrompt(SourceKind),
    ProviderUnavailable(String),
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::MissingPrompt(source) => {
                write!(f, "no {} prompt configured", source)
            }
            PauseReason::ProviderUnavailable(reason) => {
                write!(f, "provider unavailable: {}", reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    Paused(PauseReason),
    Completed {
        origins: usize,
        succeeded: usize,
        no_content: usize,
        failed: usize,
    },
}

impl TickReport {
    fn completed(reports: &[BatchReport], origins: usize) -> Self {
        let count = |f: fn(&Outcome) -> bool| reports.iter().filter(|r| f(&r.outcome)).count();
        TickReport::Completed {
            origins,
            succeeded: count(|o| matches!(o, Outcome::Imported)),
            no_content: count(|o| matches!(o, Outcome::NoRelevantContent)),
            failed: count(|o| matches!(o, Outcome::Failed(_))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub config_wait: Duration,
    pub error_backoff: Duration,
    pub max_batch_messages: usize,
}

impl PollerConfig {
    pub fn for_source(source: SourceKind, config: &ServiceConfig) -> Self {
        Self {
            interval: config.poll_interval_for(source),
            config_wait: config.config_wait,
            error_backoff: config.error_backoff,
            max_batch_messages: config.max_batch_messages,
        }
    }
}

pub struct Poller {
    source: SourceKind,
    db: Database,
    pipeline: Pipeline,
    registry: ProviderRegistry,
    fallback_gemini_key: Option<SecretString>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        source: SourceKind,
        db: Database,
        pipeline: Pipeline,
        registry: ProviderRegistry,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            db,
            pipeline,
            registry,
            fallback_gemini_key: None,
            config,
        }
    }

    /// Process-level Gemini key used when the settings row has none.
    pub fn with_fallback_gemini_key(mut self, key: SecretString) -> Self {
        self.fallback_gemini_key = Some(key);
        self
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Runs one tick.
    pub async fn tick(&mut self) -> Result<TickReport, PollError> {
        let span = info_span!("tick", component = self.source.component());
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&mut self) -> Result<TickReport, PollError> {
        let row = settings_repo::load(&self.db)?;
        let Some(template) = row
            .as_ref()
            .and_then(|r| r.prompt_for(self.source))
            .map(str::to_string)
        else {
            return Ok(TickReport::Paused(PauseReason::MissingPrompt(self.source)));
        };

        let provider = match ProviderSettings::from_row(row.as_ref(), self.fallback_gemini_key.as_ref())
        {
            Ok(settings) => self.registry.refresh(&settings).await,
            Err(e) => Err(e),
        };
        let provider = match provider {
            Ok(provider) => provider,
            Err(e) => {
                return Ok(TickReport::Paused(PauseReason::ProviderUnavailable(
                    e.to_string(),
                )))
            }
        };

        match self.source {
            SourceKind::Chat => self.tick_chat(provider, &template).await,
            SourceKind::Evidence => self.tick_evidence(provider, &template).await,
        }
    }

    async fn tick_chat(
        &self,
        provider: Arc<dyn GenerationProvider>,
        template: &str,
    ) -> Result<TickReport, PollError> {
        let pending = info_span!("select")
            .in_scope(|| selector::select_messages(&self.db, self.config.max_batch_messages))?;
        let origins = pending.len();
        if origins > 0 {
            debug!("{} rooms with pending messages", origins);
        }

        let mut reports = Vec::with_capacity(origins);
        for work in pending.into_values() {
            reports.push(
                self.pipeline
                    .process_room(provider.as_ref(), template, work)
                    .await?,
            );
        }
        Ok(TickReport::completed(&reports, origins))
    }

    async fn tick_evidence(
        &self,
        provider: Arc<dyn GenerationProvider>,
        template: &str,
    ) -> Result<TickReport, PollError> {
        let pending = info_span!("select").in_scope(|| selector::select_files(&self.db))?;
        let origins = pending.len();

        let mut reports = Vec::new();
        for work in pending.into_values() {
            for file in work.units {
                let collection_id = file.collection_id.unwrap_or(work.collection_id);
                reports.push(
                    self.pipeline
                        .process_file(provider.as_ref(), template, &work.origin, collection_id, file)
                        .await?,
                );
            }
        }
        Ok(TickReport::completed(&reports, origins))
    }

    /// Waits for a usable provider, then ticks until `shutdown` fires.
    pub async fn run(&mut self, shutdown: &Shutdown) {
        info!(
            "{} starting ({}s interval)",
            self.source.component(),
            self.config.interval.as_secs()
        );

        let wait = self.config.config_wait;
        let ready = {
            let db = self.db.clone();
            let fallback = self.fallback_gemini_key.clone();
            self.registry
                .wait_for_configuration(
                    || load_provider_settings(&db, fallback.as_ref()),
                    None,
                    wait,
                    shutdown,
                )
                .await
        };
        if let Err(e) = ready {
            info!("Stopped before a provider was ready: {}", e);
            return;
        }

        while !shutdown.is_triggered() {
            let pause = match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(TickReport::Paused(reason))) => {
                    info!("Paused: {}; retrying in {}s", reason, wait.as_secs());
                    wait
                }
                Ok(Ok(TickReport::Completed {
                    origins,
                    succeeded,
                    no_content,
                    failed,
                })) => {
                    if origins > 0 {
                        info!(
                            "Tick done: {} origins, {} imported, {} without content, {} failed",
                            origins, succeeded, no_content, failed
                        );
                    }
                    self.config.interval
                }
                Ok(Err(e)) => {
                    error!("Tick failed: {}", e);
                    self.config.error_backoff
                }
                Err(panic) => {
                    error!("Tick panicked: {}", panic_message(panic.as_ref()));
                    self.config.error_backoff
                }
            };

            if !shutdown.sleep(pause).await {
                break;
            }
        }

        info!("{} stopped", self.source.component());
    }
}

fn load_provider_settings(
    db: &Database,
    fallback_gemini_key: Option<&SecretString>,
) -> Result<ProviderSettings, ProviderError> {
    let row = settings_repo::load(db)
        .map_err(|e| ProviderError::InvalidSettings(format!("settings unavailable: {}", e)))?;
    ProviderSettings::from_row(row.as_ref(), fallback_gemini_key)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
