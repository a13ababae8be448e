use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::artifact::ArtifactStore;
use crate::db::{file_repo, message_repo, Database};
use crate::evidence::EvidenceStore;
use crate::filter::filter_output;
use crate::importer::{timeline_name, ImportRequest, TimelineImporter};
use crate::models::{Message, Origin, Outcome, SourceKind, UploadedFile};
use crate::prompt::{chat_prompt, evidence_prompt, ChatPromptContext, EvidencePromptContext};
use crate::provider::{Generation, GenerationProvider, ProviderError};
use crate::sanitize;
use crate::selector::PendingWork;

use super::config::PipelineConfig;
use super::context::{BatchContext, BatchReport, UnitState};
use super::error::PipelineError;

pub struct Pipeline {
    db: Database,
    importer: Arc<dyn TimelineImporter>,
    evidence: Arc<dyn EvidenceStore>,
    artifacts: ArtifactStore,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(
        db: Database,
        importer: Arc<dyn TimelineImporter>,
        evidence: Arc<dyn EvidenceStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        let artifacts = ArtifactStore::new(&config.output_dir);
        Self {
            db,
            importer,
            evidence,
            artifacts,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes one room's pending messages as a single batch.
    ///
    /// Unit-level failures are recorded and reported in the returned
    /// [`BatchReport`]; only a failure to record the outcome is returned as
    /// an error, leaving the messages to be selected again.
    pub async fn process_room(
        &self,
        provider: &dyn GenerationProvider,
        template: &str,
        work: PendingWork<Message>,
    ) -> Result<BatchReport, PipelineError> {
        let span = info_span!(
            "batch",
            origin = %work.origin.name,
            collection_id = work.collection_id,
            units = work.units.len(),
        );
        self.process_room_inner(provider, template, work)
            .instrument(span)
            .await
    }

    async fn process_room_inner(
        &self,
        provider: &dyn GenerationProvider,
        template: &str,
        work: PendingWork<Message>,
    ) -> Result<BatchReport, PipelineError> {
        let ids: Vec<i64> = work.units.iter().map(|m| m.id).collect();
        let force = work.units.iter().any(|m| m.force_process);
        let mut ctx = BatchContext::new(
            SourceKind::Chat,
            &work.origin,
            work.collection_id,
            ids,
            format!("room-{}", work.origin.id),
            force,
        );

        let Some(last_at) = work.units.iter().map(|m| m.created_at).max() else {
            return Ok(ctx.into_report(Outcome::NoRelevantContent, 0));
        };

        let outcome = match self.run_chat(&mut ctx, provider, template, &work).await {
            Ok(outcome) => outcome,
            Err(e) => ctx.fail(&e),
        };

        // The cursor only moves past a batch whose outcome is final and
        // successful; failed messages stay behind it, deduplicated by id.
        let advance_to = outcome.is_success().then_some(last_at);
        let recorded = info_span!("commit").in_scope(|| {
            message_repo::record_batch(
                &self.db,
                work.origin.id,
                &ctx.unit_ids,
                &outcome,
                advance_to.as_ref(),
            )
        })?;
        if outcome.is_success() {
            ctx.transition(UnitState::Committed);
        }

        info!(
            "Room {} batch of {} messages: {}",
            work.origin.id,
            ctx.unit_ids.len(),
            outcome.as_str()
        );
        Ok(ctx.into_report(outcome, recorded))
    }

    async fn run_chat(
        &self,
        ctx: &mut BatchContext,
        provider: &dyn GenerationProvider,
        template: &str,
        work: &PendingWork<Message>,
    ) -> Result<Outcome, PipelineError> {
        let prompt = info_span!("prompt").in_scope(|| {
            let messages = self.bounded_messages(&work.units);
            chat_prompt(
                template,
                &ChatPromptContext {
                    room_name: &work.origin.name,
                    messages: &messages,
                    force: ctx.force,
                },
            )
        })?;
        ctx.transition(UnitState::Prompted);

        self.generate_and_import(ctx, provider, &prompt).await
    }

    fn bounded_messages(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .map(|m| {
                let (kept, truncated) =
                    sanitize::truncate_chars(&m.content, self.config.max_content_chars);
                if truncated {
                    warn!(
                        "Message {} truncated to {} characters",
                        m.id, self.config.max_content_chars
                    );
                }
                Message {
                    content: kept.to_string(),
                    ..m.clone()
                }
            })
            .collect()
    }

    /// Processes a single uploaded file.
    pub async fn process_file(
        &self,
        provider: &dyn GenerationProvider,
        template: &str,
        origin: &Origin,
        collection_id: i64,
        file: UploadedFile,
    ) -> Result<BatchReport, PipelineError> {
        let span = info_span!(
            "batch",
            origin = %origin.name,
            collection_id = collection_id,
            units = 1,
            file = %sanitize::preview(&file.filename, 80),
        );
        self.process_file_inner(provider, template, origin, collection_id, file)
            .instrument(span)
            .await
    }

    async fn process_file_inner(
        &self,
        provider: &dyn GenerationProvider,
        template: &str,
        origin: &Origin,
        collection_id: i64,
        file: UploadedFile,
    ) -> Result<BatchReport, PipelineError> {
        let mut ctx = BatchContext::new(
            SourceKind::Evidence,
            origin,
            collection_id,
            vec![file.id],
            format!("file-{}", file.id),
            false,
        );

        let outcome = match self.run_file(&mut ctx, provider, template, origin, &file).await {
            Ok(outcome) => outcome,
            Err(e) => ctx.fail(&e),
        };

        let transitioned = info_span!("commit")
            .in_scope(|| file_repo::mark_processed(&self.db, file.id, &outcome))?;
        if !transitioned {
            debug!("File {} was already marked processed", file.id);
        }
        if outcome.is_success() {
            ctx.transition(UnitState::Committed);
        }

        info!("File {} ({}): {}", file.id, file.filename, outcome.as_str());
        Ok(ctx.into_report(outcome, usize::from(transitioned)))
    }

    async fn run_file(
        &self,
        ctx: &mut BatchContext,
        provider: &dyn GenerationProvider,
        template: &str,
        origin: &Origin,
        file: &UploadedFile,
    ) -> Result<Outcome, PipelineError> {
        let content = self
            .evidence
            .load(file)
            .instrument(info_span!("load_evidence"))
            .await?;
        let (content, truncated) = sanitize::truncate_chars(&content, self.config.max_content_chars);
        if truncated {
            warn!(
                "File {} truncated to {} characters",
                file.id, self.config.max_content_chars
            );
        }

        let file_type = file.effective_type();
        let uploader = file.uploader();
        let prompt = info_span!("prompt").in_scope(|| {
            evidence_prompt(
                template,
                &EvidencePromptContext {
                    file_type: &file_type,
                    room_name: &origin.name,
                    uploader: &uploader,
                    content,
                },
            )
        })?;
        ctx.transition(UnitState::Prompted);

        self.generate_and_import(ctx, provider, &prompt).await
    }

    /// Shared tail of both sources: generate, filter, write the artifact,
    /// import it, and remove it once imported.
    async fn generate_and_import(
        &self,
        ctx: &mut BatchContext,
        provider: &dyn GenerationProvider,
        prompt: &str,
    ) -> Result<Outcome, PipelineError> {
        let deadline = self.config.generation_timeout;
        let generation = tokio::time::timeout(
            deadline,
            provider.generate_content(prompt, &self.config.options),
        )
        .instrument(info_span!("generate", provider = %provider.kind()))
        .await
        .map_err(|_| ProviderError::Timeout(deadline.as_secs()))??;
        ctx.transition(UnitState::Generated);

        if let Generation::Empty { reason } = &generation {
            info!("Provider returned no content: {}", reason);
        }
        debug!("Model output: {}", sanitize::preview(generation.text(), 200));

        let filtered = info_span!("filter").in_scope(|| filter_output(generation.text(), ctx.force));
        ctx.rejected = filtered.rejected;
        ctx.transition(UnitState::Validated);

        if filtered.is_empty() {
            if ctx.force {
                return Err(PipelineError::NoRecords);
            }
            if filtered.rejected > 0 {
                warn!(
                    "All {} output lines were rejected; recording as no relevant content",
                    filtered.rejected
                );
            }
            return Ok(Outcome::NoRelevantContent);
        }

        let path = info_span!("write_artifact").in_scope(|| {
            self.artifacts
                .write(ctx.source, ctx.collection_id, &ctx.unit_label, &filtered.lines)
        })?;
        ctx.records = filtered.lines.len();
        ctx.artifact = Some(path.clone());
        ctx.transition(UnitState::ArtifactWritten);

        let request = ImportRequest {
            collection_id: ctx.collection_id,
            artifact: path.clone(),
            timeline_name: timeline_name(ctx.source),
        };
        let receipt = self
            .importer
            .import(&request)
            .instrument(info_span!("import", timeline = %request.timeline_name))
            .await?;
        ctx.transition(UnitState::Imported);
        if !receipt.output.is_empty() {
            debug!("Import output: {}", sanitize::preview(&receipt.output, 500));
        }

        match self.artifacts.remove(&path) {
            Ok(()) => ctx.artifact = None,
            Err(e) => warn!("Imported artifact was not removed: {}", e),
        }

        Ok(Outcome::Imported)
    }
}
