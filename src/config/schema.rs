//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The [`LogbookConfig`] struct mirroring the file
//! - Serialization to and from KDL
//! - Validation
//! - Loading from disk

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Priority;
use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log levels accepted by `log-level`.
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// database "/home/me/notes/logbook.db"
/// output-format "human"  // or "json"
/// default-priority "med"
/// log-level "info"
/// pool-size 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogbookConfig {
    /// Database file location
    pub database: Option<PathBuf>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Priority given to new items when none is passed
    pub default_priority: Option<Priority>,

    /// Tracing filter level (error, warn, info, debug, trace)
    pub log_level: Option<String>,

    /// Number of pooled connections for background readers
    pub pool_size: Option<usize>,
}

impl LogbookConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "log-level must be one of {}, got {}",
                    LOG_LEVELS.join(", "),
                    level
                ));
            }
        }
        if self.pool_size == Some(0) {
            return Err("pool-size must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes and values of the wrong
    /// shape are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = string_arg(doc, "database") {
            config.database = Some(PathBuf::from(s));
        }

        if let Some(s) = string_arg(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
        }

        // Accept both `default-priority "hi"` and `default-priority 3`
        if let Some(node) = doc.get("default-priority") {
            if let Some(entry) = node.entries().first() {
                let value = entry.value();
                config.default_priority = match (value.as_string(), value.as_integer()) {
                    (Some(s), _) => s.parse().ok(),
                    (None, Some(i)) => i64::try_from(i)
                        .ok()
                        .and_then(|n| Priority::from_number(n).ok()),
                    _ => None,
                };
            }
        }

        if let Some(s) = string_arg(doc, "log-level") {
            config.log_level = Some(s.to_lowercase());
        }

        if let Some(node) = doc.get("pool-size") {
            if let Some(i) = node.entries().first().and_then(|e| e.value().as_integer()) {
                config.pool_size = usize::try_from(i).ok();
            }
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref database) = self.database {
            push_string(&mut doc, "database", database.display().to_string());
        }
        if let Some(format) = self.output_format {
            push_string(&mut doc, "output-format", format.as_str().to_string());
        }
        if let Some(priority) = self.default_priority {
            push_string(&mut doc, "default-priority", priority.as_str().to_string());
        }
        if let Some(ref level) = self.log_level {
            push_string(&mut doc, "log-level", level.clone());
        }
        if let Some(size) = self.pool_size {
            let mut node = KdlNode::new("pool-size");
            node.push(KdlEntry::new(KdlValue::Integer(size as i128)));
            doc.nodes_mut().push(node);
        }

        doc.autoformat();
        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &LogbookConfig) {
        if other.database.is_some() {
            self.database = other.database.clone();
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
        if other.default_priority.is_some() {
            self.default_priority = other.default_priority;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
        if other.pool_size.is_some() {
            self.pool_size = other.pool_size;
        }
    }

    /// Load and validate a config file.
    ///
    /// Returns an empty config if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content.parse().map_err(|e| {
            Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e))
        })?;

        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

fn string_arg<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    doc.get(name)?.entries().first()?.value().as_string()
}

fn push_string(doc: &mut KdlDocument, name: &str, value: String) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value)));
    doc.nodes_mut().push(node);
}
