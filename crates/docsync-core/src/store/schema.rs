//! SQLite schema DDL and migration framework.

use rusqlite::Connection;

use crate::errors::SyncResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 4;

/// Core DDL statements. `IF NOT EXISTS` makes them safe to replay.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables ──────────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS sync_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS file_hashes (
        path TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        base_content TEXT,
        source_files_json TEXT NOT NULL DEFAULT '[]',
        updated_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS threshold_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_size INTEGER NOT NULL,
        change_percentage REAL NOT NULL,
        used_incremental INTEGER NOT NULL,
        success INTEGER NOT NULL,
        update_time_ms INTEGER NOT NULL,
        recorded_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS sync_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        revision TEXT,
        strategy TEXT NOT NULL,
        changed_files INTEGER NOT NULL,
        completed_operations INTEGER NOT NULL,
        failed_operations INTEGER NOT NULL,
        success INTEGER NOT NULL,
        elapsed_ms INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    // ── indexes ─────────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_artifacts_updated ON artifacts(updated_at);",
    "CREATE INDEX IF NOT EXISTS idx_sync_runs_created ON sync_runs(created_at);",
];

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations up to [`SCHEMA_VERSION`]. Each step runs inside
/// a SAVEPOINT so a failure rolls back only that step.
pub fn migrate_schema(conn: &Connection) -> SyncResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT docsync_migrate_step;")?;

        let step_result = (|| -> SyncResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                3 => migrate_to_v3(conn)?,
                4 => migrate_to_v4(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT docsync_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                tracing::debug!(version = next_version, "schema migrated");
                current_version = next_version;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT docsync_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT docsync_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                tracing::warn!(version = next_version, error = %e, "schema migration failed");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Stored schema version; 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM sync_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SyncResult<()> {
    conn.execute(
        "INSERT INTO sync_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> SyncResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> SyncResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline created by SCHEMA_STATEMENTS.
fn migrate_to_v1(_conn: &Connection) -> SyncResult<()> {
    Ok(())
}

/// v1 -> v2: conflict counts on the run audit table.
fn migrate_to_v2(conn: &Connection) -> SyncResult<()> {
    if !has_column(conn, "sync_runs", "conflicts")? {
        conn.execute_batch(
            "ALTER TABLE sync_runs ADD COLUMN conflicts INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    Ok(())
}

/// v2 -> v3: history is always read newest-first.
fn migrate_to_v3(conn: &Connection) -> SyncResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_threshold_history_recorded \
         ON threshold_history(recorded_at, id);",
    )?;
    Ok(())
}

/// v3 -> v4: parsed files of the last fully synced tree, so symbol-level
/// diffs survive restarts.
fn migrate_to_v4(conn: &Connection) -> SyncResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS baseline_files (
            path TEXT PRIMARY KEY,
            payload_json TEXT NOT NULL
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn
    }

    #[test]
    fn migrate_fresh_database() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        assert!(has_column(&conn, "sync_runs", "conflicts").unwrap());
        assert!(has_column(&conn, "baseline_files", "payload_json").unwrap());

        let steps: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migration_history WHERE status = 'success';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(steps, SCHEMA_VERSION as i64);
    }

    #[test]
    fn migrate_idempotent() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn resumes_from_stored_version() {
        let conn = fresh();
        set_schema_version(&conn, 2).unwrap();
        migrate_schema(&conn).unwrap();
        let steps: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(steps, (SCHEMA_VERSION - 2) as i64);
        // v2 was skipped, so the column it adds is absent.
        assert!(!has_column(&conn, "sync_runs", "conflicts").unwrap());
    }
}
