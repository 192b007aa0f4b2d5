//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`LB_DB`, `LB_DATA_DIR`, `LB_LOG`)
//! 3. config.kdl (`$LB_CONFIG`, else `~/.config/logbook/config.kdl`)
//! 4. Built-in defaults
//!
//! Every resolved value records where it came from, so `lb config show` can
//! explain itself.

use std::path::{Path, PathBuf};

use crate::config::{LogbookConfig, OutputFormat};
use crate::models::Priority;
use crate::storage::PoolOptions;
use crate::{Error, Result};

/// Overrides the database file path.
pub const DB_ENV: &str = "LB_DB";
/// Directory holding `logbook.db`; used when `LB_DB` is unset.
pub const DATA_DIR_ENV: &str = "LB_DATA_DIR";
/// Overrides the config file path.
pub const CONFIG_ENV: &str = "LB_CONFIG";
/// Tracing filter directive, e.g. `debug` or `logbook=trace`.
pub const LOG_ENV: &str = "LB_LOG";

/// File name of the database inside a data directory.
pub const DB_FILE_NAME: &str = "logbook.db";

const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_POOL_SIZE: usize = 4;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from a config file
    ConfigFile(PathBuf),
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile(path) => write!(f, "file:{}", path.display()),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Config file consulted, if any location could be determined
    pub config_path: Option<PathBuf>,
    pub database: Resolved<PathBuf>,
    pub output_format: Resolved<OutputFormat>,
    pub default_priority: Resolved<Priority>,
    /// Tracing filter directive
    pub log_level: Resolved<String>,
    pub pool_size: Resolved<usize>,
}

impl ResolvedConfig {
    pub fn database(&self) -> &Path {
        &self.database.value
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn default_priority(&self) -> Priority {
        self.default_priority.value
    }

    pub fn log_level(&self) -> &str {
        &self.log_level.value
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.value
    }

    /// Pool options sized by the resolved `pool-size`.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions::with_size(self.pool_size())
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub default_priority: Option<Priority>,
    /// Number of `-v` flags
    pub verbosity: u8,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = Some(priority);
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Log level implied by `-v` flags, if any were given.
    fn log_level(&self) -> Option<&'static str> {
        match self.verbosity {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Snapshot of the environment variables that affect resolution.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub db: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub log: Option<String>,
    /// Platform config directory (e.g. `~/.config`)
    pub system_config_dir: Option<PathBuf>,
    /// Platform data directory (e.g. `~/.local/share`)
    pub system_data_dir: Option<PathBuf>,
}

impl Environment {
    /// Read the process environment. Empty variables count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            db: var(DB_ENV).map(PathBuf::from),
            data_dir: var(DATA_DIR_ENV).map(PathBuf::from),
            config: var(CONFIG_ENV).map(PathBuf::from),
            log: var(LOG_ENV),
            system_config_dir: dirs::config_dir(),
            system_data_dir: dirs::data_dir(),
        }
    }

    /// Where config.kdl is looked for.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            self.system_config_dir
                .as_ref()
                .map(|d| d.join("logbook").join("config.kdl"))
        })
    }
}

/// Resolve configuration from the process environment and config file.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let env = Environment::from_env();
    let config_path = env.config_path();
    let file = match &config_path {
        Some(path) => LogbookConfig::load(path)?,
        None => LogbookConfig::new(),
    };
    resolve_with(overrides, &env, &file, config_path)
}

/// Resolve configuration from explicit inputs.
///
/// `config_path` is the file `file` was loaded from; it is recorded as the
/// source of file-provided values.
pub fn resolve_with(
    overrides: &ConfigOverrides,
    env: &Environment,
    file: &LogbookConfig,
    config_path: Option<PathBuf>,
) -> Result<ResolvedConfig> {
    let from_file = || {
        ValueSource::ConfigFile(config_path.clone().unwrap_or_else(|| PathBuf::from("config.kdl")))
    };

    // Resolve database
    let database = if let Some(ref path) = overrides.database {
        Resolved::new(path.clone(), ValueSource::CliFlag)
    } else if let Some(ref path) = env.db {
        Resolved::new(path.clone(), ValueSource::EnvVar(DB_ENV.to_string()))
    } else if let Some(ref dir) = env.data_dir {
        Resolved::new(
            dir.join(DB_FILE_NAME),
            ValueSource::EnvVar(DATA_DIR_ENV.to_string()),
        )
    } else if let Some(ref path) = file.database {
        Resolved::new(path.clone(), from_file())
    } else {
        let dir = env.system_data_dir.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "Cannot determine a data directory; set {} or pass --db",
                DB_ENV
            ))
        })?;
        Resolved::new(
            dir.join("logbook").join(DB_FILE_NAME),
            ValueSource::Default,
        )
    };

    // Resolve output_format
    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = file.output_format {
        Resolved::new(format, from_file())
    } else {
        Resolved::new(OutputFormat::default(), ValueSource::Default)
    };

    // Resolve default_priority
    let default_priority = if let Some(priority) = overrides.default_priority {
        Resolved::new(priority, ValueSource::CliFlag)
    } else if let Some(priority) = file.default_priority {
        Resolved::new(priority, from_file())
    } else {
        Resolved::new(Priority::default(), ValueSource::Default)
    };

    // Resolve log_level
    let log_level = if let Some(level) = overrides.log_level() {
        Resolved::new(level.to_string(), ValueSource::CliFlag)
    } else if let Some(ref level) = env.log {
        Resolved::new(level.clone(), ValueSource::EnvVar(LOG_ENV.to_string()))
    } else if let Some(ref level) = file.log_level {
        Resolved::new(level.clone(), from_file())
    } else {
        Resolved::new(DEFAULT_LOG_LEVEL.to_string(), ValueSource::Default)
    };

    // Resolve pool_size
    let pool_size = match file.pool_size {
        Some(size) => Resolved::new(size, from_file()),
        None => Resolved::new(DEFAULT_POOL_SIZE, ValueSource::Default),
    };

    Ok(ResolvedConfig {
        config_path,
        database,
        output_format,
        default_priority,
        log_level,
        pool_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionPool;
    use crate::test_utils::TestEnv;
    use serial_test::serial;
    use tempfile::TempDir;

    fn system_env(root: &Path) -> Environment {
        Environment {
            system_config_dir: Some(root.join("config")),
            system_data_dir: Some(root.join("data")),
            ..Default::default()
        }
    }

    // ==================== ValueSource Tests ====================

    #[test]
    fn test_value_source_display() {
        assert_eq!(
            format!("{}", ValueSource::EnvVar("LB_DB".to_string())),
            "env:LB_DB"
        );
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
        assert_eq!(
            format!("{}", ValueSource::ConfigFile(PathBuf::from("/c/config.kdl"))),
            "file:/c/config.kdl"
        );
    }

    // ==================== Config Resolution Tests ====================

    #[test]
    fn test_resolve_defaults() {
        let root = TempDir::new().unwrap();
        let env = system_env(root.path());
        let config =
            resolve_with(&ConfigOverrides::new(), &env, &LogbookConfig::new(), None).unwrap();

        assert_eq!(
            config.database(),
            root.path().join("data").join("logbook").join("logbook.db")
        );
        assert_eq!(config.database.source, ValueSource::Default);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.default_priority(), Priority::Med);
        assert_eq!(config.log_level(), "warn");
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.pool_size.source, ValueSource::Default);
    }

    #[test]
    fn test_resolve_no_data_dir_is_config_error() {
        let result = resolve_with(
            &ConfigOverrides::new(),
            &Environment::default(),
            &LogbookConfig::new(),
            None,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_file_values() {
        let root = TempDir::new().unwrap();
        let env = system_env(root.path());
        let path = root.path().join("config.kdl");
        let file = LogbookConfig {
            database: Some(PathBuf::from("/srv/lb.db")),
            output_format: Some(OutputFormat::Human),
            default_priority: Some(Priority::Hi),
            log_level: Some("debug".to_string()),
            pool_size: Some(2),
        };

        let config = resolve_with(&ConfigOverrides::new(), &env, &file, Some(path.clone())).unwrap();

        assert_eq!(config.database(), Path::new("/srv/lb.db"));
        assert_eq!(config.database.source, ValueSource::ConfigFile(path.clone()));
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.default_priority(), Priority::Hi);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.pool_size(), 2);
        assert_eq!(config.pool_size.source, ValueSource::ConfigFile(path));
    }

    #[test]
    fn test_pool_size_sizes_connection_pool() {
        let root = TempDir::new().unwrap();
        let env = system_env(root.path());
        let file = LogbookConfig {
            pool_size: Some(2),
            ..LogbookConfig::new()
        };
        let config = resolve_with(&ConfigOverrides::new(), &env, &file, None).unwrap();
        assert_eq!(config.pool_options(), PoolOptions::with_size(2));

        let test_env = TestEnv::new();
        test_env.init_storage();
        let pool = ConnectionPool::open(&test_env.db_path(), config.pool_options()).unwrap();
        assert_eq!(pool.options().size, 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_resolve_env_overrides_file() {
        let root = TempDir::new().unwrap();
        let mut env = system_env(root.path());
        env.data_dir = Some(root.path().join("isolated"));
        env.log = Some("info".to_string());
        let file = LogbookConfig {
            database: Some(PathBuf::from("/srv/lb.db")),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let config = resolve_with(&ConfigOverrides::new(), &env, &file, None).unwrap();
        assert_eq!(config.database(), root.path().join("isolated").join("logbook.db"));
        assert_eq!(
            config.database.source,
            ValueSource::EnvVar(DATA_DIR_ENV.to_string())
        );
        assert_eq!(config.log_level(), "info");

        // LB_DB beats LB_DATA_DIR
        env.db = Some(PathBuf::from("/explicit.db"));
        let config = resolve_with(&ConfigOverrides::new(), &env, &file, None).unwrap();
        assert_eq!(config.database(), Path::new("/explicit.db"));
        assert_eq!(config.database.source, ValueSource::EnvVar(DB_ENV.to_string()));
    }

    #[test]
    fn test_resolve_cli_overrides_everything() {
        let root = TempDir::new().unwrap();
        let mut env = system_env(root.path());
        env.db = Some(PathBuf::from("/env.db"));
        env.log = Some("error".to_string());
        let file = LogbookConfig {
            output_format: Some(OutputFormat::Json),
            default_priority: Some(Priority::Low),
            ..Default::default()
        };
        let overrides = ConfigOverrides::new()
            .with_database("/cli.db")
            .with_output_format(OutputFormat::Human)
            .with_default_priority(Priority::Hi)
            .with_verbosity(2);

        let config = resolve_with(&overrides, &env, &file, None).unwrap();

        assert_eq!(config.database(), Path::new("/cli.db"));
        assert_eq!(config.database.source, ValueSource::CliFlag);
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.output_format.source, ValueSource::CliFlag);
        assert_eq!(config.default_priority(), Priority::Hi);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_level.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(ConfigOverrides::new().log_level(), None);
        assert_eq!(ConfigOverrides::new().with_verbosity(1).log_level(), Some("info"));
        assert_eq!(ConfigOverrides::new().with_verbosity(5).log_level(), Some("trace"));
    }

    #[test]
    fn test_config_path_prefers_env() {
        let root = TempDir::new().unwrap();
        let mut env = system_env(root.path());
        assert_eq!(
            env.config_path(),
            Some(root.path().join("config").join("logbook").join("config.kdl"))
        );
        env.config = Some(PathBuf::from("/custom.kdl"));
        assert_eq!(env.config_path(), Some(PathBuf::from("/custom.kdl")));
    }

    #[test]
    #[serial]
    fn test_resolve_config_reads_process_env() {
        let root = TempDir::new().unwrap();
        let config_path = root.path().join("config.kdl");
        std::fs::write(&config_path, "output-format \"human\"\npool-size 3\n").unwrap();

        // SAFETY: We're in a test environment and this test runs serially
        unsafe {
            std::env::set_var(CONFIG_ENV, &config_path);
            std::env::set_var(DATA_DIR_ENV, root.path());
            std::env::remove_var(DB_ENV);
        }

        let config = resolve_config(&ConfigOverrides::new()).unwrap();

        unsafe {
            std::env::remove_var(CONFIG_ENV);
            std::env::remove_var(DATA_DIR_ENV);
        }

        assert_eq!(config.config_path, Some(config_path.clone()));
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.pool_size(), 3);
        assert_eq!(config.database(), root.path().join("logbook.db"));
    }
}
