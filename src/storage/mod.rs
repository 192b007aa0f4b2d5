//! Storage layer for Logbook data.
//!
//! [`Storage`] is the entity store: one SQLite connection with CRUD and
//! filtered queries over work items. Link and tag operations live in the
//! [`links`] and [`tags`] submodules as further `impl Storage` blocks.
//!
//! A `Storage` is always created explicitly by the caller and handed to the
//! [`Coordinator`](crate::coordinator::Coordinator). Opening a database does not
//! change its schema; call [`Storage::migrate`] once at startup.
//!
//! ## Tables
//!
//! - `work_items` - one row per item
//! - `goal_entry_count` - per-goal id sequence
//! - `item_links` - directed links, keyed by ordered pair
//! - `item_tags` - item/tag pairs
//! - `work_items_fts` - FTS5 shadow of `work_items`, kept in sync by triggers
//! - `schema_version` - migration ledger

pub mod codec;
pub mod links;
pub mod migrations;
pub mod pool;
pub mod tags;
pub mod transfer;

pub use migrations::{LedgerEntry, MigrationReport, SchemaMigrator};
pub use pool::{ConnectionPool, PoolOptions, PooledStorage};
pub use transfer::{ImportReport, Snapshot};

use rusqlite::{Connection, ErrorCode, Row, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::models::{ItemFilter, WorkItem};
use crate::storage::codec::{decode_time, encode_time};
use crate::{Error, Result};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Column list shared by every item query, in `item_from_row` order.
const ITEM_COLUMNS: &str = "w.id, w.title, w.goal, w.item_type, w.description, \
                            w.priority, w.status, w.created_at, w.updated_at";

/// Result ordering shared by every item listing.
const ITEM_ORDER: &str = "ORDER BY w.priority DESC, w.created_at DESC, w.seq DESC";

/// SQLite-backed entity store.
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Storage {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        debug!(path = %path.display(), "Opened database");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// Apply pending schema migrations.
    pub fn migrate(&mut self) -> Result<MigrationReport> {
        SchemaMigrator::new().run(&mut self.conn)
    }

    /// Current schema version (0 for an unmigrated database).
    pub fn schema_version(&self) -> Result<i64> {
        migrations::current_version(&self.conn)
    }

    /// Applied migrations, oldest first.
    pub fn ledger(&self) -> Result<Vec<LedgerEntry>> {
        migrations::ledger(&self.conn)
    }

    /// Database file path; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // === Scopes ===
    //
    // Savepoints rather than transactions, so a scope may wrap calls that
    // open their own.

    pub(crate) fn begin_scope(&self) -> Result<()> {
        self.conn.execute_batch("SAVEPOINT lb_scope")?;
        Ok(())
    }

    pub(crate) fn commit_scope(&self) -> Result<()> {
        self.conn.execute_batch("RELEASE lb_scope")?;
        Ok(())
    }

    pub(crate) fn rollback_scope(&self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK TO lb_scope; RELEASE lb_scope")?;
        Ok(())
    }

    // === Item Operations ===

    /// Insert a new item. Fails with `DuplicateId` when the id is taken.
    pub fn add(&mut self, item: &WorkItem) -> Result<()> {
        let result = self.conn.execute(
            r#"
            INSERT INTO work_items
            (id, title, goal, item_type, description, priority, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                item.id,
                item.title,
                item.goal,
                item.item_type,
                item.description,
                item.priority,
                item.status,
                encode_time(&item.created_at),
                encode_time(&item.updated_at),
            ],
        );

        match result {
            Ok(_) => {
                debug!(id = %item.id, "Inserted item");
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(Error::DuplicateId(item.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Get an item by ID.
    pub fn get(&self, id: &str) -> Result<WorkItem> {
        self.find(id)?
            .ok_or_else(|| Error::NotFound(format!("Item not found: {}", id)))
    }

    /// Get an item by ID, `None` when absent.
    pub fn find(&self, id: &str) -> Result<Option<WorkItem>> {
        let sql = format!("SELECT {} FROM work_items w WHERE w.id = ?1", ITEM_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map([id], item_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// True when an item with this id exists.
    pub fn exists(&self, id: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM work_items WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Overwrite every mutable column of an existing item.
    pub fn update(&mut self, item: &WorkItem) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE work_items SET
                title = ?2, goal = ?3, item_type = ?4, description = ?5,
                priority = ?6, status = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                item.id,
                item.title,
                item.goal,
                item.item_type,
                item.description,
                item.priority,
                item.status,
                encode_time(&item.updated_at),
            ],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("Item not found: {}", item.id)));
        }
        debug!(id = %item.id, "Updated item");
        Ok(())
    }

    /// Delete an item. Its links and tags are left in place.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM work_items WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Item not found: {}", id)));
        }
        debug!(id, "Deleted item");
        Ok(())
    }

    /// Delete several items in one transaction. Either all are deleted or,
    /// when any id is absent, none are.
    pub fn delete_many(&mut self, ids: &[String]) -> Result<usize> {
        let tx = self.conn.savepoint()?;
        for id in ids {
            let changed = tx.execute("DELETE FROM work_items WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Item not found: {}", id)));
            }
        }
        tx.commit()?;
        debug!(count = ids.len(), "Deleted items");
        Ok(ids.len())
    }

    /// List items matching every set field of `filter`.
    ///
    /// Ordered by priority (highest first), then creation time (newest first).
    pub fn list(&self, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        let mut sql = format!("SELECT {} FROM work_items w", ITEM_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(tag) = &filter.tag {
            sql.push_str(" JOIN item_tags t ON t.item_id = w.id AND t.tag = ?");
            params_vec.push(Box::new(tags::normalize_tag(tag)));
        }

        sql.push_str(" WHERE 1=1");

        if let Some(goal) = &filter.goal {
            sql.push_str(" AND LOWER(w.goal) = LOWER(?)");
            params_vec.push(Box::new(goal.clone()));
        }
        if let Some(item_type) = filter.item_type {
            sql.push_str(" AND w.item_type = ?");
            params_vec.push(Box::new(item_type));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND w.status = ?");
            params_vec.push(Box::new(status));
        }
        if let Some(priority) = filter.priority {
            sql.push_str(" AND w.priority = ?");
            params_vec.push(Box::new(priority));
        }
        if let Some(text) = &filter.search {
            sql.push_str(
                " AND (LOWER(w.title) LIKE ? ESCAPE '\\' OR LOWER(w.description) LIKE ? ESCAPE '\\')",
            );
            let term = format!("%{}%", escape_like(&text.to_lowercase()));
            params_vec.push(Box::new(term.clone()));
            params_vec.push(Box::new(term));
        }

        sql.push(' ');
        sql.push_str(ITEM_ORDER);

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_refs.as_slice(), item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Full-text search over title and description, best match first.
    ///
    /// Each whitespace-separated word must appear (stemmed); FTS operators in
    /// the input are treated as plain text.
    pub fn search(&self, query: &str) -> Result<Vec<WorkItem>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM work_items_fts JOIN work_items w ON w.seq = work_items_fts.rowid \
             WHERE work_items_fts MATCH ?1 ORDER BY work_items_fts.rank",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([terms.join(" ")], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Every item keyed by id.
    pub fn all_items(&self) -> Result<HashMap<String, WorkItem>> {
        let sql = format!("SELECT {} FROM work_items w", ITEM_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([], item_from_row)?
            .map(|r| r.map(|item| (item.id.clone(), item)))
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(items)
    }

    /// Number of stored items.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Insert many items in one transaction. Nothing is written if any insert fails.
    pub fn batch_insert(&mut self, items: &[WorkItem]) -> Result<usize> {
        let tx = self.conn.savepoint()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO work_items
                (id, title, goal, item_type, description, priority, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for item in items {
                let result = stmt.execute(params![
                    item.id,
                    item.title,
                    item.goal,
                    item.item_type,
                    item.description,
                    item.priority,
                    item.status,
                    encode_time(&item.created_at),
                    encode_time(&item.updated_at),
                ]);
                match result {
                    Ok(_) => {}
                    Err(e) if is_constraint_violation(&e) => {
                        return Err(Error::DuplicateId(item.id.clone()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;
        debug!(count = items.len(), "Batch inserted items");
        Ok(items.len())
    }

    /// Distinct goals, sorted.
    pub fn goals(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT goal FROM work_items ORDER BY goal")?;
        let goals = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(goals)
    }

    // === Entry Counts ===

    /// Per-goal id sequence counters.
    pub fn entry_counts(&self) -> Result<HashMap<String, u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT goal, count FROM goal_entry_count")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, u32>>>()?;
        Ok(counts)
    }

    pub fn set_entry_count(&mut self, goal: &str, count: u32) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO goal_entry_count (goal, count) VALUES (?1, ?2)
            ON CONFLICT(goal) DO UPDATE SET count = excluded.count
            "#,
            params![goal, count],
        )?;
        Ok(())
    }

    // === Maintenance ===

    /// Rebuild the database file to reclaim free pages.
    pub fn vacuum(&mut self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        debug!("Vacuumed database");
        Ok(())
    }

    /// Flush the write-ahead log into the main database file, so a file-level
    /// copy taken afterwards is complete.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Map a row selected with [`ITEM_COLUMNS`] to a `WorkItem`.
fn item_from_row(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(WorkItem {
        id: row.get(0)?,
        title: row.get(1)?,
        goal: row.get(2)?,
        item_type: row.get(3)?,
        description: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        created_at: decode_time(&created_at, 7)?,
        updated_at: decode_time(&updated_at, 8)?,
    })
}

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}
