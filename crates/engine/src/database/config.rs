//! Database configuration via `optimist.toml`
//!
//! On first open, a default `optimist.toml` is created in the data directory.
//! To change settings, edit the file and reopen.

use optimist_concurrency::{IsolationLevel, DEFAULT_LARGE_BLOCK};
use optimist_core::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "optimist.toml";

/// Database configuration loaded from `optimist.toml`.
///
/// # Example
///
/// ```toml
/// # Isolation level: "none", "snapshot" or "serializable" (default)
/// isolation = "serializable"
///
/// # Buffered writes before a transaction switches to exclusive mode
/// large_block = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimistConfig {
    /// Isolation level: `"none"`, `"snapshot"` or `"serializable"`.
    #[serde(default = "default_isolation_str")]
    pub isolation: String,
    /// Size of a buffered delta that triggers the exclusive-mode upgrade.
    #[serde(default = "default_large_block")]
    pub large_block: usize,
    /// Save named queries to the data directory on shutdown.
    #[serde(default = "default_true")]
    pub persist_named_queries: bool,
}

fn default_isolation_str() -> String {
    IsolationLevel::default().as_str().to_string()
}

fn default_large_block() -> usize {
    DEFAULT_LARGE_BLOCK
}

fn default_true() -> bool {
    true
}

impl Default for OptimistConfig {
    fn default() -> Self {
        Self {
            isolation: default_isolation_str(),
            large_block: default_large_block(),
            persist_named_queries: true,
        }
    }
}

impl OptimistConfig {
    /// Parse the isolation string into an `IsolationLevel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string names no isolation level.
    pub fn isolation_level(&self) -> StoreResult<IsolationLevel> {
        self.isolation.parse().map_err(|_| {
            StoreError::invalid_input(format!(
                "Invalid isolation level '{}' in {}. Expected \"none\", \"snapshot\" or \"serializable\".",
                self.isolation, CONFIG_FILE_NAME
            ))
        })
    }

    /// Check every field, returning the parsed isolation level.
    pub fn validate(&self) -> StoreResult<IsolationLevel> {
        if self.large_block == 0 {
            return Err(StoreError::invalid_input(format!(
                "large_block in {} must be greater than zero",
                CONFIG_FILE_NAME
            )));
        }
        self.isolation_level()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Optimist database configuration
#
# Isolation level: "none", "snapshot" or "serializable" (default)
#   "none"         = reads see the latest committed state, nothing is checked
#   "snapshot"     = commit fails if the transaction saw a changing store
#   "serializable" = snapshot, plus commit fails if a concurrent commit
#                    changed anything this transaction read
isolation = "serializable"

# Buffered writes before a transaction switches to exclusive mode (default: 10000).
# An exclusive transaction writes straight through and blocks new transactions.
large_block = 10000

# Save named queries to named_queries.json on shutdown (default: true)
persist_named_queries = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds
    /// invalid values.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: OptimistConfig = toml::from_str(&content).map_err(|e| {
            StoreError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StoreError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
