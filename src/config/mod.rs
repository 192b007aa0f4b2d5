//! Configuration for Logbook.
//!
//! ## config.kdl - User preferences
//!
//! Located at `$LB_CONFIG`, or `~/.config/logbook/config.kdl` by default.
//!
//! Contains:
//! - `database` - Path of the SQLite database file
//! - `output-format` - "json" or "human"
//! - `default-priority` - Priority for new items ("low", "med", "hi")
//! - `log-level` - Tracing level written to stderr
//! - `pool-size` - Pooled connections for background readers
//!
//! ## Precedence
//!
//! CLI flag > environment > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, Environment, Resolved, ResolvedConfig, ValueSource, resolve_config,
    resolve_with,
};
pub use schema::{LogbookConfig, OutputFormat};
