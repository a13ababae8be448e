use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::models::{Origin, Outcome, SourceKind};

use super::error::PipelineError;

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Selected,
    Prompted,
    Generated,
    Validated,
    ArtifactWritten,
    Imported,
    Committed,
    Failed(String),
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Selected => "selected",
            UnitState::Prompted => "prompted",
            UnitState::Generated => "generated",
            UnitState::Validated => "validated",
            UnitState::ArtifactWritten => "artifact_written",
            UnitState::Imported => "imported",
            UnitState::Committed => "committed",
            UnitState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Committed | UnitState::Failed(_))
    }

    /// Forward edges of the lifecycle. `Validated -> Committed` is the
    /// no-relevant-content path; any live state may fail.
    pub fn can_transition_to(&self, next: &UnitState) -> bool {
        use UnitState::*;
        match (self, next) {
            (_, Failed(_)) => !self.is_terminal(),
            (Selected, Prompted)
            | (Prompted, Generated)
            | (Generated, Validated)
            | (Validated, ArtifactWritten)
            | (Validated, Committed)
            | (ArtifactWritten, Imported)
            | (Imported, Committed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Failed(reason) => write!(f, "failed({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Mutable state threaded through one pipeline run.
pub struct BatchContext {
    pub source: SourceKind,
    pub origin_id: i64,
    pub collection_id: i64,
    pub unit_ids: Vec<i64>,
    /// File-name label for the artifact (`room-7`, `file-12`).
    pub unit_label: String,
    pub force: bool,
    pub state: UnitState,
    pub records: usize,
    pub rejected: usize,
    /// Set once written; cleared again when the artifact is removed after
    /// a successful import.
    pub artifact: Option<PathBuf>,
}

impl BatchContext {
    pub fn new(
        source: SourceKind,
        origin: &Origin,
        collection_id: i64,
        unit_ids: Vec<i64>,
        unit_label: String,
        force: bool,
    ) -> Self {
        Self {
            source,
            origin_id: origin.id,
            collection_id,
            unit_ids,
            unit_label,
            force,
            state: UnitState::Selected,
            records: 0,
            rejected: 0,
            artifact: None,
        }
    }

    pub fn transition(&mut self, next: UnitState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            "{} {} units {:?}: {} -> {}",
            self.source, self.unit_label, self.unit_ids, self.state, next
        );
        self.state = next;
    }

    /// Moves the batch to `Failed` and returns the outcome to record.
    pub fn fail(&mut self, error: &PipelineError) -> Outcome {
        let reason = error.to_string();
        warn!(
            "{} {} failed in state {}: {}",
            self.source, self.unit_label, self.state, reason
        );
        self.transition(UnitState::Failed(reason.clone()));
        Outcome::Failed(reason)
    }

    pub fn into_report(self, outcome: Outcome, recorded: usize) -> BatchReport {
        BatchReport {
            source: self.source,
            origin_id: self.origin_id,
            collection_id: self.collection_id,
            unit_ids: self.unit_ids,
            state: self.state,
            outcome,
            records: self.records,
            rejected: self.rejected,
            retained_artifact: self.artifact,
            recorded,
        }
    }
}

/// What happened to one batch (a room's messages or a single file).
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub source: SourceKind,
    pub origin_id: i64,
    pub collection_id: i64,
    pub unit_ids: Vec<i64>,
    pub state: UnitState,
    pub outcome: Outcome,
    /// Records written to the artifact.
    pub records: usize,
    /// Model output lines dropped by the filter.
    pub rejected: usize,
    /// Artifact left on disk because import failed.
    pub retained_artifact: Option<PathBuf>,
    /// Units newly marked processed by this run.
    pub recorded: usize,
}
