//! Operation runner that regenerates artifacts and reconciles hand edits.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::diff::merge::three_way_merge;
use crate::errors::SyncResult;
use crate::models::{now_millis, Artifact, ChangeInfo, ChangeType, MergeConflict, OperationKind, UpdateOperation};
use crate::ports::{ArtifactStore, ContentGenerator, GenerationRequest, SyncLedger};
use crate::query::artifacts::INDEX_ARTIFACT;
use crate::scheduler::executor::OperationRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOutcome {
    Created,
    /// Replaced wholesale; there were no hand edits to preserve.
    Regenerated,
    /// Hand edits and regenerated content merged cleanly.
    Merged,
    /// Left untouched; the conflict is reported instead.
    Conflicted,
    Unchanged,
}

/// Hand edits that could not be reconciled with regenerated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConflict {
    pub artifact_id: String,
    /// Merged text with conflict markers; never saved.
    pub merged: String,
    pub conflicts: Vec<MergeConflict>,
}

pub struct ArtifactUpdater<'a> {
    store: &'a dyn ArtifactStore,
    generator: &'a dyn ContentGenerator,
    ledger: Option<&'a dyn SyncLedger>,
    changes: HashMap<String, ChangeInfo>,
    requests: HashMap<String, GenerationRequest>,
    /// Paths whose file operation ran, awaiting [`ArtifactUpdater::commit_files`].
    staged: Mutex<Vec<String>>,
    conflicts: Mutex<Vec<ArtifactConflict>>,
    outcomes: Mutex<Vec<(String, ArtifactOutcome)>>,
}

impl<'a> ArtifactUpdater<'a> {
    pub fn new(store: &'a dyn ArtifactStore, generator: &'a dyn ContentGenerator) -> Self {
        Self {
            store,
            generator,
            ledger: None,
            changes: HashMap::new(),
            requests: HashMap::new(),
            staged: Mutex::new(Vec::new()),
            conflicts: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    /// Ledger that [`ArtifactUpdater::commit_files`] writes hashes to.
    pub fn with_ledger(mut self, ledger: &'a dyn SyncLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_changes(mut self, changes: &[ChangeInfo]) -> Self {
        self.changes = changes
            .iter()
            .map(|c| (c.file_path.clone(), c.clone()))
            .collect();
        self
    }

    pub fn with_requests(mut self, requests: impl IntoIterator<Item = GenerationRequest>) -> Self {
        self.requests = requests
            .into_iter()
            .map(|r| (r.artifact_id.clone(), r))
            .collect();
        self
    }

    pub fn conflicts(&self) -> Vec<ArtifactConflict> {
        self.conflicts.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<(String, ArtifactOutcome)> {
        self.outcomes.lock().clone()
    }

    fn record(&self, artifact_id: &str, outcome: ArtifactOutcome) -> ArtifactOutcome {
        self.outcomes.lock().push((artifact_id.to_string(), outcome));
        outcome
    }

    /// Regenerate one artifact. Stored content without hand edits is
    /// replaced; hand-edited content is three-way merged with the last
    /// generated text as base, and saved only when the merge is clean.
    pub fn update_artifact(&self, artifact_id: &str) -> SyncResult<ArtifactOutcome> {
        let existing = self.store.load(artifact_id)?;
        let mut request = self.requests.get(artifact_id).cloned().unwrap_or_else(|| {
            GenerationRequest {
                artifact_id: artifact_id.to_string(),
                changed_files: Vec::new(),
                symbols: Vec::new(),
                previous: None,
            }
        });
        request.previous = existing.as_ref().map(|a| a.content.clone());
        let generated = self.generator.generate(&request)?;

        let Some(current) = existing else {
            let mut artifact = Artifact::generated(artifact_id, generated);
            artifact.source_files = request.changed_files;
            self.store.save(&artifact)?;
            return Ok(self.record(artifact_id, ArtifactOutcome::Created));
        };

        if current.base_content.as_deref() == Some(generated.as_str()) && !current.has_local_edits() {
            return Ok(self.record(artifact_id, ArtifactOutcome::Unchanged));
        }

        let mut updated = current.clone();
        for file in &request.changed_files {
            if !updated.source_files.contains(file) {
                updated.source_files.push(file.clone());
            }
        }
        updated.updated_at = now_millis();

        if !current.has_local_edits() {
            updated.content = generated.clone();
            updated.base_content = Some(generated);
            self.store.save(&updated)?;
            return Ok(self.record(artifact_id, ArtifactOutcome::Regenerated));
        }

        let base = current.base_content.as_deref().unwrap_or("");
        let merge = three_way_merge(base, &current.content, &generated);
        if !merge.resolved {
            tracing::warn!(
                artifact = artifact_id,
                conflicts = merge.conflicts.len(),
                "hand edits conflict with regenerated content"
            );
            self.conflicts.lock().push(ArtifactConflict {
                artifact_id: artifact_id.to_string(),
                merged: merge.merged,
                conflicts: merge.conflicts,
            });
            return Ok(self.record(artifact_id, ArtifactOutcome::Conflicted));
        }
        updated.content = merge.merged;
        updated.base_content = Some(generated);
        self.store.save(&updated)?;
        tracing::debug!(artifact = artifact_id, "hand edits merged into regenerated content");
        Ok(self.record(artifact_id, ArtifactOutcome::Merged))
    }

    /// Rewrite the index artifact listing every other stored artifact.
    pub fn rebuild_index(&self) -> SyncResult<Artifact> {
        let mut lines = vec!["# Index".to_string(), String::new()];
        let mut ids = self.store.list()?;
        ids.retain(|id| id != INDEX_ARTIFACT);
        ids.sort();
        for id in &ids {
            let title = match self.store.load(id)? {
                Some(artifact) => artifact.title,
                None => id.clone(),
            };
            lines.push(format!("- {title} (`{id}`)"));
        }
        let mut index = Artifact::generated(INDEX_ARTIFACT, lines.join("\n") + "\n");
        index.title = "Index".to_string();
        index.source_files = ids;
        self.store.save(&index)?;
        Ok(index)
    }

    /// File operations only stage their path. Hashes reach the ledger
    /// through [`ArtifactUpdater::commit_files`], which the cycle calls after
    /// a fully successful run, so a failed artifact leaves its source files
    /// looking changed.
    fn sync_file(&self, path: &str) -> SyncResult<()> {
        if self.changes.contains_key(path) {
            self.staged.lock().push(path.to_string());
        }
        Ok(())
    }

    /// Write the ledger hashes of every staged file. Returns how many were
    /// committed.
    pub fn commit_files(&self) -> SyncResult<usize> {
        let Some(ledger) = self.ledger else {
            return Ok(0);
        };
        let staged = std::mem::take(&mut *self.staged.lock());
        for path in &staged {
            let Some(change) = self.changes.get(path) else {
                continue;
            };
            match change.change_type {
                ChangeType::Deleted => ledger.remove_file_hash(path)?,
                ChangeType::Renamed => {
                    if let Some(old) = &change.old_path {
                        ledger.remove_file_hash(old)?;
                    }
                    if let Some(hash) = &change.new_hash {
                        ledger.set_file_hash(path, hash)?;
                    }
                }
                ChangeType::Added | ChangeType::Modified => {
                    if let Some(hash) = &change.new_hash {
                        ledger.set_file_hash(path, hash)?;
                    }
                }
            }
        }
        tracing::debug!(files = staged.len(), "file hashes committed");
        Ok(staged.len())
    }
}

impl OperationRunner for ArtifactUpdater<'_> {
    fn run(&self, operation: &UpdateOperation) -> SyncResult<()> {
        match operation.kind {
            OperationKind::SyncFile | OperationKind::RemoveFile => self.sync_file(&operation.target),
            OperationKind::UpdateArtifact => self.update_artifact(&operation.target).map(|_| ()),
            OperationKind::UpdateIndex => self.rebuild_index().map(|_| ()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::errors::SyncError;

    /// Renders `# <id>` followed by the changed files, one per line.
    pub struct ListingGenerator {
        pub fail_on: Option<String>,
    }

    impl ContentGenerator for ListingGenerator {
        fn generate(&self, request: &GenerationRequest) -> SyncResult<String> {
            if self.fail_on.as_deref() == Some(request.artifact_id.as_str()) {
                return Err(SyncError::Generation(format!(
                    "cannot render {}",
                    request.artifact_id
                )));
            }
            let mut out = format!("# {}\n", request.artifact_id);
            for file in &request.changed_files {
                out.push_str(&format!("- {file}\n"));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::ListingGenerator;
    use super::*;
    use crate::store::Database;

    struct Fixed(&'static str);

    impl ContentGenerator for Fixed {
        fn generate(&self, _request: &GenerationRequest) -> SyncResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("state.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn creates_then_regenerates() {
        let (_dir, db) = db();
        let generator = ListingGenerator { fail_on: None };
        let updater = ArtifactUpdater::new(&db, &generator).with_requests([GenerationRequest {
            artifact_id: "module-src".into(),
            changed_files: vec!["src/a.ts".into()],
            symbols: vec![],
            previous: None,
        }]);
        assert_eq!(updater.update_artifact("module-src").unwrap(), ArtifactOutcome::Created);
        assert_eq!(updater.update_artifact("module-src").unwrap(), ArtifactOutcome::Unchanged);

        let stored = db.load("module-src").unwrap().unwrap();
        assert_eq!(stored.content, "# module-src\n- src/a.ts\n");
        assert_eq!(stored.source_files, vec!["src/a.ts"]);
    }

    #[test]
    fn hand_edits_survive_a_clean_merge() {
        let (_dir, db) = db();
        let mut artifact = Artifact::generated("guide", "title\nintro\nbody\nfooter\n");
        artifact.content = "title\nintro (edited)\nbody\nfooter\n".into();
        db.save(&artifact).unwrap();

        let generator = Fixed("title\nintro\nbody\nnew footer\n");
        let updater = ArtifactUpdater::new(&db, &generator);
        assert_eq!(updater.update_artifact("guide").unwrap(), ArtifactOutcome::Merged);

        let stored = db.load("guide").unwrap().unwrap();
        assert_eq!(stored.content, "title\nintro (edited)\nbody\nnew footer\n");
        assert_eq!(stored.base_content.as_deref(), Some("title\nintro\nbody\nnew footer\n"));
    }

    #[test]
    fn conflicts_are_reported_not_saved() {
        let (_dir, db) = db();
        let mut artifact = Artifact::generated("guide", "a\nb\nc\n");
        artifact.content = "a\nmine\nc\n".into();
        db.save(&artifact).unwrap();

        let generator = Fixed("a\ntheirs\nc\n");
        let updater = ArtifactUpdater::new(&db, &generator);
        assert_eq!(updater.update_artifact("guide").unwrap(), ArtifactOutcome::Conflicted);

        let conflicts = updater.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].artifact_id, "guide");
        assert!(conflicts[0].merged.contains("<<<<<<< OURS"));
        assert_eq!(db.load("guide").unwrap().unwrap().content, "a\nmine\nc\n");
    }

    #[test]
    fn index_lists_other_artifacts() {
        let (_dir, db) = db();
        db.save(&Artifact::generated("overview", "o")).unwrap();
        db.save(&Artifact::generated("api-reference", "a")).unwrap();
        let generator = Fixed("");
        let updater = ArtifactUpdater::new(&db, &generator);
        updater.rebuild_index().unwrap();
        let index = updater.rebuild_index().unwrap();
        assert_eq!(
            index.content,
            "# Index\n\n- api-reference (`api-reference`)\n- overview (`overview`)\n"
        );
    }

    #[test]
    fn file_hashes_commit_only_when_asked() {
        let (_dir, db) = db();
        db.set_file_hash("old.ts", "h").unwrap();
        db.set_file_hash("gone.ts", "g").unwrap();
        let mut rename = ChangeInfo::new("new.ts", ChangeType::Renamed).with_hashes(Some("h".into()), Some("h".into()));
        rename.old_path = Some("old.ts".into());
        let removal = ChangeInfo::new("gone.ts", ChangeType::Deleted);

        let generator = Fixed("");
        let updater = ArtifactUpdater::new(&db, &generator)
            .with_ledger(&db)
            .with_changes(&[rename, removal]);
        let op = |kind, target: &str| UpdateOperation {
            id: target.to_string(),
            kind,
            target: target.to_string(),
            priority: 1,
            retry_count: 0,
            estimated_ms: 1,
            depends_on: vec![],
        };
        updater.run(&op(OperationKind::SyncFile, "new.ts")).unwrap();
        updater.run(&op(OperationKind::RemoveFile, "gone.ts")).unwrap();
        assert_eq!(db.tracked_files().unwrap(), vec!["gone.ts", "old.ts"]);

        assert_eq!(updater.commit_files().unwrap(), 2);
        assert_eq!(db.tracked_files().unwrap(), vec!["new.ts"]);
        assert_eq!(updater.commit_files().unwrap(), 0);
    }
}
