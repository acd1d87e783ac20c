//! File-level change detection against the hash ledger.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{SyncError, SyncResult};
use crate::models::{now_millis, ChangeInfo, ChangeType};
use crate::ports::{SyncLedger, VersionControlSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedChanges {
    /// Revision the changes were computed against.
    pub revision: String,
    pub previous_revision: Option<String>,
    pub changes: Vec<ChangeInfo>,
    pub warnings: Vec<String>,
}

/// Classify one path from its ledger hash and its current hash.
fn classify(path: &str, old: Option<String>, new: Option<String>) -> Option<ChangeInfo> {
    let change_type = match (&old, &new) {
        (None, None) => return None,
        (None, Some(_)) => ChangeType::Added,
        (Some(_), None) => ChangeType::Deleted,
        (Some(a), Some(b)) if a == b => return None,
        (Some(_), Some(_)) => ChangeType::Modified,
    };
    let mut change = ChangeInfo::new(path, change_type).with_hashes(old, new);
    change.timestamp = now_millis();
    Some(change)
}

/// A deletion and an addition carrying the same content hash become one
/// rename, reported at the new path.
pub fn collapse_renames(changes: Vec<ChangeInfo>) -> Vec<ChangeInfo> {
    let mut deleted: IndexMap<String, usize> = IndexMap::new();
    for (i, change) in changes.iter().enumerate() {
        if change.change_type == ChangeType::Deleted {
            if let Some(hash) = &change.old_hash {
                deleted.entry(hash.clone()).or_insert(i);
            }
        }
    }

    let mut consumed = vec![false; changes.len()];
    let mut renamed: Vec<Option<String>> = vec![None; changes.len()];
    for (i, change) in changes.iter().enumerate() {
        if change.change_type != ChangeType::Added {
            continue;
        }
        let Some(hash) = &change.new_hash else {
            continue;
        };
        if let Some(from) = deleted.shift_remove(hash) {
            consumed[from] = true;
            renamed[i] = Some(changes[from].file_path.clone());
        }
    }

    changes
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .map(|(i, mut change)| {
            if let Some(old_path) = renamed[i].take() {
                change.change_type = ChangeType::Renamed;
                change.old_hash = change.new_hash.clone();
                change.old_path = Some(old_path);
            }
            change
        })
        .collect()
}

/// Diff the paths the VCS reports against the ledger. Every tracked path is
/// re-checked too, so removals surface as deletions even when the VCS does
/// not list them.
pub fn detect_file_changes(
    vcs: &dyn VersionControlSource,
    ledger: &dyn SyncLedger,
) -> SyncResult<DetectedChanges> {
    if !vcs.is_repository() {
        return Err(SyncError::NotARepository(
            "version control source is not a repository".to_string(),
        ));
    }
    let revision = vcs.current_revision()?;
    let previous_revision = ledger.last_revision()?;

    let mut candidates: IndexMap<String, ()> = IndexMap::new();
    let mut warnings = Vec::new();
    for path in vcs.changed_files_since(previous_revision.as_deref())? {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            tracing::warn!("ignoring empty path from version control");
            warnings.push("empty path reported by version control".to_string());
            continue;
        }
        candidates.insert(trimmed.to_string(), ());
    }
    for path in ledger.tracked_files()? {
        candidates.entry(path).or_insert(());
    }

    let mut changes = Vec::new();
    for path in candidates.keys() {
        let old = ledger.file_hash(path)?;
        let new = vcs.content_hash(path)?;
        if let Some(change) = classify(path, old, new) {
            changes.push(change);
        }
    }
    let changes = collapse_renames(changes);

    tracing::debug!(
        revision = %revision,
        previous = previous_revision.as_deref().unwrap_or("-"),
        candidates = candidates.len(),
        changes = changes.len(),
        "file changes detected"
    );
    Ok(DetectedChanges {
        revision,
        previous_revision,
        changes,
        warnings,
    })
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::models::content_hash;

    /// In-memory working tree.
    pub struct FakeRepo {
        pub is_repo: bool,
        pub revision: Mutex<u32>,
        pub files: Mutex<HashMap<String, String>>,
    }

    impl FakeRepo {
        pub fn new(files: &[(&str, &str)]) -> Self {
            Self {
                is_repo: true,
                revision: Mutex::new(1),
                files: Mutex::new(
                    files
                        .iter()
                        .map(|(p, c)| (p.to_string(), c.to_string()))
                        .collect(),
                ),
            }
        }

        pub fn write(&self, path: &str, content: &str) {
            self.files.lock().insert(path.to_string(), content.to_string());
            *self.revision.lock() += 1;
        }

        pub fn remove(&self, path: &str) {
            self.files.lock().remove(path);
            *self.revision.lock() += 1;
        }
    }

    impl VersionControlSource for FakeRepo {
        fn is_repository(&self) -> bool {
            self.is_repo
        }

        fn current_revision(&self) -> SyncResult<String> {
            Ok(format!("r{}", self.revision.lock()))
        }

        fn changed_files_since(&self, _revision: Option<&str>) -> SyncResult<Vec<String>> {
            let mut paths: Vec<String> = self.files.lock().keys().cloned().collect();
            paths.sort();
            Ok(paths)
        }

        fn content_hash(&self, path: &str) -> SyncResult<Option<String>> {
            Ok(self.files.lock().get(path).map(|c| content_hash(c)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeRepo;
    use super::*;
    use crate::models::content_hash;
    use crate::store::Database;

    fn ledger() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("state.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn classifies_against_the_ledger() {
        let (_dir, db) = ledger();
        db.set_file_hash("same.ts", &content_hash("same")).unwrap();
        db.set_file_hash("edited.ts", &content_hash("before")).unwrap();
        db.set_file_hash("gone.ts", &content_hash("gone")).unwrap();
        let repo = FakeRepo::new(&[("same.ts", "same"), ("edited.ts", "after"), ("new.ts", "x")]);

        let detected = detect_file_changes(&repo, &db).unwrap();
        let kinds: Vec<(&str, ChangeType)> = detected
            .changes
            .iter()
            .map(|c| (c.file_path.as_str(), c.change_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("edited.ts", ChangeType::Modified),
                ("new.ts", ChangeType::Added),
                ("gone.ts", ChangeType::Deleted),
            ]
        );
        assert_eq!(detected.revision, "r1");
        assert_eq!(detected.previous_revision, None);
    }

    #[test]
    fn moved_content_is_a_rename() {
        let (_dir, db) = ledger();
        db.set_file_hash("src/old.ts", &content_hash("body")).unwrap();
        let repo = FakeRepo::new(&[("src/new.ts", "body")]);

        let detected = detect_file_changes(&repo, &db).unwrap();
        assert_eq!(detected.changes.len(), 1);
        let change = &detected.changes[0];
        assert_eq!(change.change_type, ChangeType::Renamed);
        assert_eq!(change.file_path, "src/new.ts");
        assert_eq!(change.old_path.as_deref(), Some("src/old.ts"));
    }

    #[test]
    fn tracked_removals_surface_after_a_recorded_revision() {
        struct SilentOnRemovals(FakeRepo);

        impl VersionControlSource for SilentOnRemovals {
            fn is_repository(&self) -> bool {
                true
            }
            fn current_revision(&self) -> SyncResult<String> {
                self.0.current_revision()
            }
            fn changed_files_since(&self, _revision: Option<&str>) -> SyncResult<Vec<String>> {
                Ok(Vec::new())
            }
            fn content_hash(&self, path: &str) -> SyncResult<Option<String>> {
                self.0.content_hash(path)
            }
        }

        let (_dir, db) = ledger();
        db.set_file_hash("kept.ts", &content_hash("kept")).unwrap();
        db.set_file_hash("gone.ts", &content_hash("gone")).unwrap();
        db.set_last_revision("r0").unwrap();
        let repo = SilentOnRemovals(FakeRepo::new(&[("kept.ts", "kept")]));

        let detected = detect_file_changes(&repo, &db).unwrap();
        assert_eq!(detected.previous_revision.as_deref(), Some("r0"));
        assert_eq!(detected.changes.len(), 1);
        assert_eq!(detected.changes[0].file_path, "gone.ts");
        assert_eq!(detected.changes[0].change_type, ChangeType::Deleted);
    }

    #[test]
    fn not_a_repository_is_fatal() {
        let (_dir, db) = ledger();
        let mut repo = FakeRepo::new(&[]);
        repo.is_repo = false;
        let err = detect_file_changes(&repo, &db).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SyncError::NotARepository(_)));
    }

    #[test]
    fn rename_collapse_pairs_each_hash_once() {
        let changes = vec![
            ChangeInfo::new("a.ts", ChangeType::Deleted).with_hashes(Some("h".into()), None),
            ChangeInfo::new("b.ts", ChangeType::Added).with_hashes(None, Some("h".into())),
            ChangeInfo::new("c.ts", ChangeType::Added).with_hashes(None, Some("h".into())),
        ];
        let collapsed = collapse_renames(changes);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].change_type, ChangeType::Renamed);
        assert_eq!(collapsed[0].file_path, "b.ts");
        assert_eq!(collapsed[1].change_type, ChangeType::Added);
    }
}
