//! Store configuration via `recon.toml`
//!
//! File-backed stores keep their configuration in a config file inside
//! the data directory. On first open a commented default is written; to
//! change settings, edit the file and reopen the store.

use recon_cache::CacheConfig;
use recon_core::{RecondbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Config file name placed in the data directory
pub const CONFIG_FILE_NAME: &str = "recon.toml";

/// Where (and whether) writes are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// File-backed records under the data directory
    File,
    /// Map-backed double; durable for the process lifetime only
    Memory,
    /// No persistent tier at all
    None,
}

impl Default for PersistenceMode {
    fn default() -> Self {
        PersistenceMode::File
    }
}

/// Store configuration
///
/// # Example
///
/// ```toml
/// # Persistence: "file" (default), "memory", or "none"
/// persistence = "file"
///
/// # Cache sizing
/// cache_capacity = 1024
/// cache_ttl_secs = 300
///
/// # Maximum edit distance for fuzzy search
/// fuzzy_distance = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Persistence mode
    #[serde(default)]
    pub persistence: PersistenceMode,
    /// Cache capacity in entries
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum edit distance for fuzzy search
    #[serde(default = "default_fuzzy_distance")]
    pub fuzzy_distance: usize,
    /// Data directory; required for file persistence, never serialized
    #[serde(skip)]
    pub data_dir: Option<PathBuf>,
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_fuzzy_distance() -> usize {
    2
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::default(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fuzzy_distance: default_fuzzy_distance(),
            data_dir: None,
        }
    }
}

impl StoreConfig {
    /// Config for a store backed by the in-process memory double
    pub fn in_memory() -> Self {
        Self {
            persistence: PersistenceMode::Memory,
            ..Default::default()
        }
    }

    /// Config for a store with no persistent tier
    pub fn ephemeral() -> Self {
        Self {
            persistence: PersistenceMode::None,
            ..Default::default()
        }
    }

    /// Config for a file-backed store rooted at the given directory
    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence: PersistenceMode::File,
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    /// Builder: set the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Builder: set the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Cache configuration derived from this config
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    /// Load configuration from a data directory, writing a commented
    /// default file on first open
    ///
    /// The returned config always carries `data_dir`.
    pub fn load_or_init(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let path = data_dir.join(CONFIG_FILE_NAME);

        let mut config = if path.exists() {
            Self::parse(&std::fs::read_to_string(&path)?)?
        } else {
            std::fs::write(&path, Self::default_toml())?;
            info!(path = %path.display(), "wrote default config");
            Self::default()
        };
        config.data_dir = Some(data_dir);
        Ok(config)
    }

    /// Parse a config document
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| RecondbError::validation(format!("invalid {}: {}", CONFIG_FILE_NAME, e)))
    }

    /// Default config file content, with comments
    pub fn default_toml() -> &'static str {
        r#"# recondb store configuration
#
# Persistence: "file" (default), "memory", or "none"
#   "file"   = one JSON record per entity under this directory
#   "memory" = process-lifetime only; useful for scratch stores
#   "none"   = no persistent tier
persistence = "file"

# Cache sizing
cache_capacity = 1024
cache_ttl_secs = 300

# Maximum edit distance for fuzzy search
fuzzy_distance = 2
"#
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.persistence == PersistenceMode::File && self.data_dir.is_none() {
            return Err(RecondbError::validation(
                "file persistence requires a data directory",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(RecondbError::validation("cache_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Resolved data directory
    ///
    /// # Errors
    ///
    /// Fails when file persistence was requested without one.
    pub fn data_dir(&self) -> Result<&Path> {
        self.data_dir
            .as_deref()
            .ok_or_else(|| RecondbError::validation("no data directory configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_toml_parses_to_default() {
        let parsed = StoreConfig::parse(StoreConfig::default_toml()).unwrap();
        assert_eq!(parsed.persistence, PersistenceMode::File);
        assert_eq!(parsed.cache_capacity, 1024);
        assert_eq!(parsed.cache_ttl_secs, 300);
        assert_eq!(parsed.fuzzy_distance, 2);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed = StoreConfig::parse("persistence = \"memory\"\n").unwrap();
        assert_eq!(parsed.persistence, PersistenceMode::Memory);
        assert_eq!(parsed.cache_capacity, 1024);
    }

    #[test]
    fn test_invalid_file_rejected() {
        assert!(StoreConfig::parse("persistence = \"granite\"").is_err());
    }

    #[test]
    fn test_load_or_init_writes_default() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::load_or_init(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(config.data_dir.as_deref(), Some(dir.path()));

        // Second open reads the same file back.
        let again = StoreConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(again.cache_capacity, config.cache_capacity);
    }

    #[test]
    fn test_validate_file_mode_requires_dir() {
        let config = StoreConfig::default();
        assert!(config.validate().is_err());
        assert!(StoreConfig::in_memory().validate().is_ok());
    }
}
