//! Logbook - a local-first store for work items and the links between them.
//!
//! This library provides the core functionality for the `lb` CLI tool:
//! SQLite-backed work items, a typed link graph with cycle-aware traversal,
//! tags, a versioned schema ledger with full-text search, and the
//! [`coordinator::Coordinator`] that keeps an in-memory mirror consistent
//! with the durable store.

pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod storage;


/// Library-level error type for Logbook operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another item already has the same normalized title, type and priority.
    #[error("Duplicate item found (ID: {existing_id}): {title}")]
    Duplicate { existing_id: String, title: String },

    #[error("Item with ID {0} already exists")]
    DuplicateId(String),

    #[error("Migration v{version} ({description}) failed: {source}")]
    Migration {
        version: i64,
        description: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Transient: every pooled connection stayed busy for the whole retry budget.
    #[error("No database connection available after {attempts} attempts")]
    PoolExhausted { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors a caller may retry without risk of data loss.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::PoolExhausted { .. } => true,
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type alias for Logbook operations.
pub type Result<T> = std::result::Result<T, Error>;
