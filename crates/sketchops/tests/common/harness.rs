//! Test harness for isolated poller runs.
//!
//! Each `TestHarness` owns a temp directory holding a file-backed database
//! and the artifact output directory, and builds pollers wired to the fakes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use tempfile::TempDir;

use sketchops::db::settings_repo::{self, PlatformSettingsRow};
use sketchops::evidence::EvidenceStore;
use sketchops::importer::TimelineImporter;
use sketchops::models::format_timestamp;
use sketchops::provider::ProviderRegistry;
use sketchops::{Database, Pipeline, PipelineConfig, Poller, PollerConfig, SourceKind};

use super::fakes::{FakeEvidence, FakeImporter, FakeProvider, ProviderScript};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub output_dir: PathBuf,
    pub script: ProviderScript,
    pub importer: Arc<FakeImporter>,
    pub evidence: Arc<FakeEvidence>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("platform.db"))
            .expect("Failed to open database");
        let output_dir = temp_dir.path().join("sketch_files");

        Self {
            temp_dir,
            db,
            output_dir,
            script: ProviderScript::default(),
            importer: Arc::new(FakeImporter::default()),
            evidence: Arc::new(FakeEvidence::default()),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A poller for `source` wired to this harness's fakes, with
    /// millisecond sleeps.
    pub fn poller(&self, source: SourceKind) -> Poller {
        self.poller_with_batch(source, 200)
    }

    pub fn poller_with_batch(&self, source: SourceKind, max_batch_messages: usize) -> Poller {
        let importer: Arc<dyn TimelineImporter> = self.importer.clone();
        let evidence: Arc<dyn EvidenceStore> = self.evidence.clone();
        let pipeline = Pipeline::new(
            self.db.clone(),
            importer,
            evidence,
            Arc::new(PipelineConfig::new(&self.output_dir)),
        );

        let script = self.script.clone();
        let registry =
            ProviderRegistry::with_factory(move |_| Box::new(FakeProvider::new(script.clone())));

        let config = PollerConfig {
            interval: Duration::from_millis(5),
            config_wait: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
            max_batch_messages,
        };
        Poller::new(source, self.db.clone(), pipeline, registry, config)
            .with_fallback_gemini_key(SecretString::from("test-gemini-key"))
    }

    pub fn set_prompts(&self, chat: Option<&str>, evidence: Option<&str>) {
        settings_repo::store(
            &self.db,
            &PlatformSettingsRow {
                sketch_operator_prompt: chat.map(String::from),
                evidence_processor_prompt: evidence.map(String::from),
                ai_provider: Some("gemini".into()),
                ..Default::default()
            },
        )
        .expect("Failed to store settings");
    }

    pub fn room(&self, id: i64, name: &str, sketch_id: Option<i64>) {
        self.exec(
            "INSERT INTO rooms (id, name, active, sketch_id, created_at) VALUES (?1, ?2, 1, ?3, ?4)",
            rusqlite::params![id, name, sketch_id, format_timestamp(&at(0))],
        );
    }

    pub fn user(&self, id: i64, username: &str) {
        self.exec(
            "INSERT INTO users (id, username, team) VALUES (?1, ?2, 'blue')",
            rusqlite::params![id, username],
        );
    }

    pub fn message(&self, id: i64, room_id: i64, user_id: i64, created_at: DateTime<Utc>, body: &str) {
        self.exec(
            "INSERT INTO messages (id, room_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, room_id, user_id, body, format_timestamp(&created_at)],
        );
    }

    pub fn uploaded_file(&self, id: i64, room_id: i64, filename: &str, created_at: DateTime<Utc>) {
        self.exec(
            "INSERT INTO uploaded_files
                (id, room_id, filename, file_path, file_type, uploader_username, uploader_team, created_at)
             VALUES (?1, ?2, ?3, ?3, 'log', 'alice', 'blue', ?4)",
            rusqlite::params![id, room_id, filename, format_timestamp(&created_at)],
        );
    }

    /// Artifact files currently on disk.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn exec(&self, sql: &str, params: impl rusqlite::Params) {
        self.db
            .with_conn(|conn| {
                conn.execute(sql, params)?;
                Ok(())
            })
            .expect("Failed to insert fixture row");
    }
}

/// `2024-10-16T09:MM:00Z`
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 16, 9, minute, 0).unwrap()
}
