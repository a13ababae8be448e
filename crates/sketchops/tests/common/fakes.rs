//! In-process stand-ins for the LLM backend, the `timesketch` client and
//! evidence storage.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sketchops::evidence::{EvidenceError, EvidenceStore};
use sketchops::importer::{ImportError, ImportReceipt, ImportRequest, TimelineImporter};
use sketchops::models::UploadedFile;
use sketchops::provider::{
    Generation, GenerationOptions, GenerationProvider, ProviderError, ProviderKind,
    ProviderSettings,
};

/// What the fake provider answers to the next call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(String),
}

/// Replies and recorded prompts, shared between the test and every
/// provider instance the registry builds.
#[derive(Clone, Default)]
pub struct ProviderScript {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
    prompts: Vec<String>,
}

impl ProviderScript {
    /// Answer used once the queue is empty.
    pub fn always(&self, reply: Reply) {
        self.inner.lock().unwrap().fallback = Some(reply);
    }

    pub fn push(&self, reply: Reply) {
        self.inner.lock().unwrap().queued.push_back(reply);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().prompts.len()
    }

    fn next(&self, prompt: &str) -> Reply {
        let mut state = self.inner.lock().unwrap();
        state.prompts.push(prompt.to_string());
        state
            .queued
            .pop_front()
            .or_else(|| state.fallback.clone())
            .unwrap_or_else(|| Reply::Error("no scripted reply".into()))
    }
}

pub struct FakeProvider {
    script: ProviderScript,
}

impl FakeProvider {
    pub fn new(script: ProviderScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn initialize(&mut self, _settings: &ProviderSettings) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate_content(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Generation, ProviderError> {
        match self.script.next(prompt) {
            Reply::Text(text) => Ok(Generation::Text(text)),
            Reply::Error(reason) => Err(ProviderError::Api {
                provider: ProviderKind::Gemini,
                status: 503,
                message: reason,
            }),
        }
    }

    fn validate_configuration(&self) -> bool {
        true
    }
}

/// One captured import, with the artifact read at call time.
#[derive(Debug, Clone)]
pub struct ImportCall {
    pub collection_id: i64,
    pub timeline_name: String,
    pub lines: Vec<String>,
}

#[derive(Default)]
pub struct FakeImporter {
    fail: AtomicBool,
    calls: Mutex<Vec<ImportCall>>,
}

impl FakeImporter {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ImportCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimelineImporter for FakeImporter {
    async fn import(&self, request: &ImportRequest) -> Result<ImportReceipt, ImportError> {
        let content = std::fs::read_to_string(&request.artifact).map_err(|e| ImportError::Spawn {
            program: "fake-timesketch".into(),
            source: e,
        })?;
        self.calls.lock().unwrap().push(ImportCall {
            collection_id: request.collection_id,
            timeline_name: request.timeline_name.clone(),
            lines: content.split('\n').map(String::from).collect(),
        });

        if self.fail.load(Ordering::SeqCst) {
            return Err(ImportError::Failed {
                code: "1".into(),
                stderr: "sketch is archived".into(),
            });
        }
        Ok(ImportReceipt {
            output: "Timeline imported".into(),
        })
    }

    async fn create_collection(&self, _name: &str) -> Result<i64, ImportError> {
        Ok(42)
    }
}

/// Evidence contents keyed by file id.
#[derive(Default)]
pub struct FakeEvidence {
    files: Mutex<HashMap<i64, String>>,
}

impl FakeEvidence {
    pub fn insert(&self, file_id: i64, content: &str) {
        self.files.lock().unwrap().insert(file_id, content.to_string());
    }
}

#[async_trait]
impl EvidenceStore for FakeEvidence {
    async fn load(&self, file: &UploadedFile) -> Result<String, EvidenceError> {
        self.files
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or(EvidenceError::NotText { id: file.id })
    }
}
