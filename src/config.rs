#![forbid(unsafe_code)]

//! Service configuration loaded from TOML.
//!
//! Every section and key is optional. Command-line flags (and the
//! environment variables backing them) override values read from the file.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StoreOptions;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 50051;
/// Default page size when a request gives none (or an invalid one).
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Largest page size a request may ask for.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Backing store settings.
    pub database: DatabaseConfig,
    /// HTTP adapter settings.
    pub server: ServerConfig,
    /// Pagination window bounds.
    pub pagination: PaginationConfig,
    /// Log filtering.
    pub logging: LoggingConfig,
}

/// `[database]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Pool checkout timeout in milliseconds.
    pub acquire_timeout_ms: u64,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("follow-graph.db"),
            pool_size: crate::storage::DEFAULT_POOL_SIZE,
            acquire_timeout_ms: crate::storage::DEFAULT_ACQUIRE_TIMEOUT.as_millis() as u64,
            busy_timeout_ms: crate::storage::DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DatabaseConfig {
    /// Store options matching this section.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new(&self.path)
            .pool_size(self.pool_size)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

/// `[server]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Per-request deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// Extra CORS origins.
    pub allow_origins: Vec<String>,
    /// Reject mutating endpoints.
    pub read_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            request_timeout_ms: 10_000,
            allow_origins: Vec::new(),
            read_only: false,
        }
    }
}

impl ServerConfig {
    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `[pagination]` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    /// Window used when a request omits `limit` or sends one out of range.
    pub default_limit: u32,
    /// Largest accepted window.
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

/// `[logging]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Dotted key.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ServiceConfig {
    /// Loads configuration from `explicit`, else from the default location
    /// when it exists, else defaults. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => ServiceConfig::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "database.pool_size",
                reason: "must be at least 1",
            });
        }
        if self.pagination.default_limit == 0 || self.pagination.max_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "pagination",
                reason: "limits must be at least 1",
            });
        }
        if self.pagination.default_limit > self.pagination.max_limit {
            return Err(ConfigError::Invalid {
                key: "pagination.default_limit",
                reason: "must not exceed pagination.max_limit",
            });
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "server.request_timeout_ms",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `<config dir>/follow-graph/config.toml`, when the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("follow-graph").join("config.toml"))
}
