//! SQLite state store.
//!
//! Holds generated artifacts, the per-path hash ledger, the last synced
//! revision, threshold controller history and a run audit log. Each method
//! opens its own connection, so a `Database` is freely shareable across the
//! executor's worker threads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{SyncError, SyncResult};
use crate::models::{now_millis, Artifact, ParsedFile, ThresholdRecord};
use crate::ports::{ArtifactStore, SyncLedger, SyncRun};
use crate::store::schema;

const LAST_REVISION_KEY: &str = "last_revision";

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

fn resolve(path: &Path) -> SyncResult<PathBuf> {
    let expanded = expand_tilde(&path.to_string_lossy());
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Resolve the path and create missing parent directories. The schema is
    /// not touched until [`Database::init_schema`].
    pub fn new(db_path: impl AsRef<Path>) -> SyncResult<Self> {
        let resolved = resolve(db_path.as_ref())?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { db_path: resolved })
    }

    /// Open, initialise and migrate in one step.
    pub fn open(db_path: impl AsRef<Path>) -> SyncResult<Self> {
        let db = Self::new(db_path)?;
        db.init_schema()?;
        Ok(db)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> SyncResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn init_schema(&self) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> SyncResult<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1 LIMIT 1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sync_meta(key, value) VALUES(?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }

    /// Most recent `limit` audit rows, oldest first.
    pub fn recent_runs(&self, limit: usize) -> SyncResult<Vec<SyncRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT revision, strategy, changed_files, completed_operations, \
                    failed_operations, conflicts, success, elapsed_ms \
             FROM sync_runs ORDER BY id DESC LIMIT ?1;",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SyncRun {
                revision: row.get(0)?,
                strategy: row.get(1)?,
                changed_files: row.get::<_, i64>(2)? as usize,
                completed_operations: row.get::<_, i64>(3)? as usize,
                failed_operations: row.get::<_, i64>(4)? as usize,
                conflicts: row.get::<_, i64>(5)? as usize,
                success: row.get::<_, i64>(6)? != 0,
                elapsed_ms: row.get::<_, i64>(7)? as u64,
            })
        })?;
        let mut runs = rows.collect::<Result<Vec<_>, _>>()?;
        runs.reverse();
        Ok(runs)
    }

    /// Copy the database to `destination` with the SQLite backup API.
    pub fn backup_to(&self, destination: impl AsRef<Path>) -> SyncResult<PathBuf> {
        let resolved = resolve(destination.as_ref())?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src = self.connect()?;
        let mut dst = Connection::open(&resolved)?;
        let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
        backup.run_to_completion(100, Duration::from_millis(10), None)?;
        Ok(resolved)
    }

    pub fn restore_from(&self, source: impl AsRef<Path>) -> SyncResult<()> {
        let resolved = resolve(source.as_ref())?;
        if !resolved.exists() {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Backup file does not exist: {}", resolved.display()),
            )));
        }
        let src = Connection::open(&resolved)?;
        let mut dst = self.connect()?;
        let backup = rusqlite::backup::Backup::new(&src, &mut dst)?;
        backup.run_to_completion(100, Duration::from_millis(10), None)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artifact storage
// ---------------------------------------------------------------------------

impl ArtifactStore for Database {
    fn load(&self, id: &str) -> SyncResult<Option<Artifact>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT id, title, content, base_content, source_files_json, updated_at \
                 FROM artifacts WHERE id = ?1;",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, title, content, base_content, sources, updated_at)) => Ok(Some(Artifact {
                id,
                title,
                content,
                base_content,
                source_files: serde_json::from_str(&sources)?,
                updated_at,
            })),
        }
    }

    fn save(&self, artifact: &Artifact) -> SyncResult<()> {
        let conn = self.connect()?;
        let sources = serde_json::to_string(&artifact.source_files)?;
        conn.execute(
            "INSERT INTO artifacts(id, title, content, base_content, source_files_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
                title = excluded.title, \
                content = excluded.content, \
                base_content = excluded.base_content, \
                source_files_json = excluded.source_files_json, \
                updated_at = excluded.updated_at;",
            params![
                artifact.id,
                artifact.title,
                artifact.content,
                artifact.base_content,
                sources,
                artifact.updated_at
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> SyncResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM artifacts ORDER BY id;")?;
        let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(ids.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete(&self, id: &str) -> SyncResult<bool> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM artifacts WHERE id = ?1;", params![id])?;
        Ok(removed > 0)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

impl SyncLedger for Database {
    fn file_hash(&self, path: &str) -> SyncResult<Option<String>> {
        let conn = self.connect()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM file_hashes WHERE path = ?1;",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    fn set_file_hash(&self, path: &str, hash: &str) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO file_hashes(path, content_hash, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(path) DO UPDATE SET \
                content_hash = excluded.content_hash, updated_at = excluded.updated_at;",
            params![path, hash, now_millis()],
        )?;
        Ok(())
    }

    fn remove_file_hash(&self, path: &str) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM file_hashes WHERE path = ?1;", params![path])?;
        Ok(())
    }

    fn tracked_files(&self) -> SyncResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path FROM file_hashes ORDER BY path;")?;
        let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(paths.collect::<Result<Vec<_>, _>>()?)
    }

    fn last_revision(&self) -> SyncResult<Option<String>> {
        self.get_meta(LAST_REVISION_KEY)
    }

    fn set_last_revision(&self, revision: &str) -> SyncResult<()> {
        self.set_meta(LAST_REVISION_KEY, revision)
    }

    fn threshold_history(&self, limit: usize) -> SyncResult<Vec<ThresholdRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT project_size, change_percentage, used_incremental, success, update_time_ms \
             FROM threshold_history ORDER BY id DESC LIMIT ?1;",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ThresholdRecord {
                project_size: row.get::<_, i64>(0)? as usize,
                change_percentage: row.get(1)?,
                used_incremental: row.get::<_, i64>(2)? != 0,
                success: row.get::<_, i64>(3)? != 0,
                update_time_ms: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut records = rows.collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    fn record_threshold(&self, record: &ThresholdRecord) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO threshold_history(project_size, change_percentage, used_incremental, \
                                           success, update_time_ms, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                record.project_size as i64,
                record.change_percentage,
                record.used_incremental as i64,
                record.success as i64,
                record.update_time_ms as i64,
                now_millis()
            ],
        )?;
        Ok(())
    }

    fn record_run(&self, run: &SyncRun) -> SyncResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sync_runs(revision, strategy, changed_files, completed_operations, \
                                   failed_operations, conflicts, success, elapsed_ms, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                run.revision,
                run.strategy,
                run.changed_files as i64,
                run.completed_operations as i64,
                run.failed_operations as i64,
                run.conflicts as i64,
                run.success as i64,
                run.elapsed_ms as i64,
                now_millis()
            ],
        )?;
        Ok(())
    }

    fn baseline_files(&self) -> SyncResult<Vec<ParsedFile>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT payload_json FROM baseline_files ORDER BY path;")?;
        let payloads = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut files = Vec::new();
        for payload in payloads {
            files.push(serde_json::from_str(&payload?)?);
        }
        Ok(files)
    }

    fn set_baseline_files(&self, files: &[ParsedFile]) -> SyncResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM baseline_files;", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO baseline_files(path, payload_json) VALUES (?1, ?2);",
            )?;
            for file in files {
                insert.execute(params![file.path, serde_json::to_string(file)?])?;
            }
        }
        tx.commit()?;
        tracing::debug!(files = files.len(), "baseline stored");
        Ok(())
    }
}
