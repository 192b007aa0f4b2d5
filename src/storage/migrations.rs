//! Versioned schema migrations.
//!
//! The `schema_version` table is an append-only ledger; `max(version)` is the
//! current schema version. Each pending migration runs in its own transaction
//! as DDL, then backfill, then the ledger insert, so a ledger row for version N
//! exists only if N was applied completely. A failing step is rolled back and
//! stops the run; versions recorded before it stay applied.

use chrono::Utc;
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::storage::codec::encode_time;
use crate::{Error, Result};

/// One schema step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

impl Migration {
    pub const fn new(
        version: i64,
        description: &'static str,
        apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
    ) -> Self {
        Self {
            version,
            description,
            apply,
        }
    }
}

/// All migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration::new(1, "Core work item, link and tag tables", core_tables),
    Migration::new(2, "Normalize legacy item type codes and tags", legacy_backfill),
    Migration::new(3, "Full-text search table and sync triggers", fts_tables),
];

/// A row of the schema ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: i64,
    pub applied_at: String,
    pub description: String,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Version before the run
    pub from: i64,
    /// Version after the run
    pub to: i64,
    /// Versions applied by this run, ascending
    pub applied: Vec<i64>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a list of migrations against a connection.
pub struct SchemaMigrator<'a> {
    migrations: &'a [Migration],
}

impl Default for SchemaMigrator<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaMigrator<'static> {
    /// Migrator over the built-in [`MIGRATIONS`].
    pub fn new() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }
}

impl<'a> SchemaMigrator<'a> {
    /// Migrator over a custom list. The list must be sorted by version.
    pub fn with_migrations(migrations: &'a [Migration]) -> Self {
        Self { migrations }
    }

    /// Apply every migration newer than the ledger's current version.
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationReport> {
        ensure_ledger(conn)?;
        let from = current_version(conn)?;
        info!(version = from, "Current schema version");

        let mut applied = Vec::new();
        for migration in self.migrations.iter().filter(|m| m.version > from) {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );
            apply_one(conn, migration).map_err(|source| Error::Migration {
                version: migration.version,
                description: migration.description.to_string(),
                source,
            })?;
            applied.push(migration.version);
        }

        let to = applied.last().copied().unwrap_or(from);
        if !applied.is_empty() {
            info!(from, to, count = applied.len(), "Schema migrated");
        }
        Ok(MigrationReport { from, to, applied })
    }
}

fn ensure_ledger(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    (migration.apply)(&tx)?;
    tx.execute(
        "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        params![
            migration.version,
            encode_time(&Utc::now()),
            migration.description
        ],
    )?;
    tx.commit()?;
    debug!(version = migration.version, "Migration committed");
    Ok(())
}

/// Highest applied version, or 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Every ledger row, oldest first.
pub fn ledger(conn: &Connection) -> Result<Vec<LedgerEntry>> {
    if current_version(conn)? == 0 {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT version, applied_at, description FROM schema_version ORDER BY version ASC",
    )?;
    let entries = stmt
        .query_map([], |row| {
            Ok(LedgerEntry {
                version: row.get(0)?,
                applied_at: row.get(1)?,
                description: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

// === Migration steps ===

fn core_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    // Links and tags carry no foreign keys: deleting an item leaves them
    // dangling on purpose.
    tx.execute_batch(
        r#"
        -- `seq` aliases the rowid, so VACUUM keeps it and the FTS index
        -- can use it as its content rowid.
        CREATE TABLE IF NOT EXISTS work_items (
            seq INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            goal TEXT NOT NULL,
            item_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            priority INTEGER NOT NULL DEFAULT 2,
            status TEXT NOT NULL DEFAULT 'not_started',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_work_items_goal ON work_items(goal);
        CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);
        CREATE INDEX IF NOT EXISTS idx_work_items_priority ON work_items(priority);
        CREATE INDEX IF NOT EXISTS idx_work_items_type ON work_items(item_type);
        CREATE INDEX IF NOT EXISTS idx_work_items_goal_priority_created
            ON work_items(goal, priority DESC, created_at DESC);

        CREATE TABLE IF NOT EXISTS goal_entry_count (
            goal TEXT PRIMARY KEY,
            count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS item_links (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            link_type TEXT NOT NULL DEFAULT 'references',
            created_at TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_item_links_source ON item_links(source_id);
        CREATE INDEX IF NOT EXISTS idx_item_links_target ON item_links(target_id);
        CREATE INDEX IF NOT EXISTS idx_item_links_type ON item_links(link_type);

        CREATE TABLE IF NOT EXISTS item_tags (
            item_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (item_id, tag)
        );

        CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag);
        "#,
    )
}

fn legacy_backfill(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let mut updated = 0;
    for (code, name) in [
        ("t", "task"),
        ("l", "learning"),
        ("r", "research"),
        ("th", "thought"),
    ] {
        updated += tx.execute(
            "UPDATE work_items SET item_type = ?2 WHERE item_type = ?1",
            params![code, name],
        )?;
    }

    // Normalizing may fold two spellings of a tag into one row.
    tx.execute_batch(
        r#"
        INSERT OR IGNORE INTO item_tags (item_id, tag)
            SELECT item_id, lower(trim(tag)) FROM item_tags WHERE tag != lower(trim(tag));
        DELETE FROM item_tags WHERE tag != lower(trim(tag)) OR tag = '';
        "#,
    )?;

    debug!(updated, "Backfilled legacy item type codes");
    Ok(())
}

fn fts_tables(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS work_items_fts USING fts5(
            id, title, description,
            content = 'work_items',
            content_rowid = 'seq',
            tokenize = 'porter unicode61 remove_diacritics 1'
        );

        CREATE TRIGGER IF NOT EXISTS work_items_ai AFTER INSERT ON work_items
        BEGIN
            INSERT INTO work_items_fts(rowid, id, title, description)
            VALUES (new.seq, new.id, new.title, new.description);
        END;

        CREATE TRIGGER IF NOT EXISTS work_items_ad AFTER DELETE ON work_items
        BEGIN
            INSERT INTO work_items_fts(work_items_fts, rowid, id, title, description)
            VALUES ('delete', old.seq, old.id, old.title, old.description);
        END;

        CREATE TRIGGER IF NOT EXISTS work_items_au AFTER UPDATE ON work_items
        BEGIN
            INSERT INTO work_items_fts(work_items_fts, rowid, id, title, description)
            VALUES ('delete', old.seq, old.id, old.title, old.description);
            INSERT INTO work_items_fts(rowid, id, title, description)
            VALUES (new.seq, new.id, new.title, new.description);
        END;

        -- Index rows written before the triggers existed
        INSERT INTO work_items_fts(work_items_fts) VALUES ('rebuild');
        "#,
    )
}
