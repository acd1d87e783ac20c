//! Collaborator contracts.
//!
//! The engine never touches a working tree, a database or a generator
//! directly; it talks to these traits. `store::Database` implements the
//! storage side, everything else is supplied by the embedding application.

use serde::{Deserialize, Serialize};

use crate::errors::SyncResult;
use crate::models::{Artifact, ParsedFile, ThresholdRecord};

/// Read-only view of the version-control system holding the source tree.
pub trait VersionControlSource: Send + Sync {
    fn is_repository(&self) -> bool;

    fn current_revision(&self) -> SyncResult<String>;

    /// Paths touched since `revision`; every tracked path when `None`.
    fn changed_files_since(&self, revision: Option<&str>) -> SyncResult<Vec<String>>;

    /// Hash of the path's current content, `None` when the path no longer exists.
    fn content_hash(&self, path: &str) -> SyncResult<Option<String>>;
}

pub trait ParsedFileProvider: Send + Sync {
    /// Parse records for every file currently in the tree.
    fn parsed_files(&self) -> SyncResult<Vec<ParsedFile>>;
}

/// Persistence for generated artifacts.
pub trait ArtifactStore: Send + Sync {
    fn load(&self, id: &str) -> SyncResult<Option<Artifact>>;
    fn save(&self, artifact: &Artifact) -> SyncResult<()>;
    fn list(&self) -> SyncResult<Vec<String>>;
    /// Returns whether an artifact was removed.
    fn delete(&self, id: &str) -> SyncResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub artifact_id: String,
    /// Files whose changes triggered the regeneration.
    pub changed_files: Vec<String>,
    /// Symbol ids mapped to the artifact.
    pub symbols: Vec<String>,
    /// Currently stored content, if any.
    pub previous: Option<String>,
}

/// Produces replacement text for an artifact.
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> SyncResult<String>;
}

/// Bookkeeping the pipeline keeps between cycles.
pub trait SyncLedger: Send + Sync {
    fn file_hash(&self, path: &str) -> SyncResult<Option<String>>;
    fn set_file_hash(&self, path: &str, hash: &str) -> SyncResult<()>;
    fn remove_file_hash(&self, path: &str) -> SyncResult<()>;
    fn tracked_files(&self) -> SyncResult<Vec<String>>;

    fn last_revision(&self) -> SyncResult<Option<String>>;
    fn set_last_revision(&self, revision: &str) -> SyncResult<()>;

    /// Most recent `limit` outcomes, oldest first.
    fn threshold_history(&self, limit: usize) -> SyncResult<Vec<ThresholdRecord>>;
    fn record_threshold(&self, record: &ThresholdRecord) -> SyncResult<()>;

    /// Append an audit row for a finished cycle.
    fn record_run(&self, run: &SyncRun) -> SyncResult<()>;

    /// Parsed files of the last fully synced tree; empty before the first
    /// successful cycle.
    fn baseline_files(&self) -> SyncResult<Vec<ParsedFile>>;
    /// Replace the stored baseline with `files`.
    fn set_baseline_files(&self, files: &[ParsedFile]) -> SyncResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub revision: Option<String>,
    pub strategy: String,
    pub changed_files: usize,
    pub completed_operations: usize,
    pub failed_operations: usize,
    pub conflicts: usize,
    pub success: bool,
    pub elapsed_ms: u64,
}
