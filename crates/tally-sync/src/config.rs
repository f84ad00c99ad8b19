//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_CLOUD_URL=https://cloud.example.com                          │
//! │     TALLY_SYNC_INTERVAL_MS=30000                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cloud credentials never appear here. They live in the configuration
//! record written by provisioning, so they can rotate without a restart.
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! [cloud]
//! base_url = "https://cloud.example.com"
//! connect_timeout_secs = 10
//!
//! [sync]
//! interval_ms = 30000
//! batch_size = 10
//! retry_delay_ms = 5000
//! startup_delay_ms = 2000
//! push_multiplier = 10
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tally_core::{DEFAULT_BATCH_SIZE, DEFAULT_RETRY_DELAY_MS, PUSH_INTERVAL_MULTIPLIER};

use crate::error::{SyncError, SyncResult};

const CONFIG_FILE_NAME: &str = "tally.toml";
const DATABASE_FILE_NAME: &str = "tally.db";

// =============================================================================
// Cloud Settings
// =============================================================================

/// Where the cloud backend lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Base URL; sync paths are resolved under it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// TCP connect timeout (seconds). Requests themselves have no deadline.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Timing of the background sync loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between scheduled passes (milliseconds).
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Outbox entries attempted per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Delay before the follow-up pass while entries remain (milliseconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Delay before the first pass after startup (milliseconds).
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,

    /// Config push runs every `push_multiplier × interval_ms`.
    #[serde(default = "default_push_multiplier")]
    pub push_multiplier: u32,
}

fn default_interval() -> u64 {
    30_000
}
fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}
fn default_startup_delay() -> u64 {
    2_000
}
fn default_push_multiplier() -> u32 {
    PUSH_INTERVAL_MULTIPLIER
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_ms: default_interval(),
            batch_size: default_batch_size(),
            retry_delay_ms: default_retry_delay(),
            startup_delay_ms: default_startup_delay(),
            push_multiplier: default_push_multiplier(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Cadence of the config push.
    pub fn push_interval(&self) -> Duration {
        self.interval().saturating_mul(self.push_multiplier)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Location of the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration of a terminal process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.cloud.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Cloud URL must start with http:// or https://, got: {}",
                self.cloud.base_url
            )));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_ms must be greater than 0".into(),
            ));
        }

        if self.sync.push_multiplier == 0 {
            return Err(SyncError::InvalidConfig(
                "push_multiplier must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup` (the process environment in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TALLY_CLOUD_URL") {
            debug!(url = %url, "Overriding cloud URL from environment");
            self.cloud.base_url = url;
        }

        if let Some(interval) = lookup("TALLY_SYNC_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.sync.interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid TALLY_SYNC_INTERVAL_MS"),
            }
        }

        if let Some(delay) = lookup("TALLY_RETRY_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => self.sync.retry_delay_ms = ms,
                Err(_) => warn!(value = %delay, "Ignoring invalid TALLY_RETRY_DELAY_MS"),
            }
        }

        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "tally", "pos")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the SQLite file to open.
    ///
    /// Falls back to the platform data directory, then the working directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }

        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
    }

    /// Returns the cloud base URL.
    pub fn cloud_url(&self) -> &str {
        &self.cloud.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.sync.push_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.cloud.base_url = "ftp://cloud.example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.cloud.base_url = "not a url".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.cloud.base_url = "https://cloud.example.com".into();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());

        config.sync.batch_size = 10;
        config.sync.push_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TALLY_CLOUD_URL", "https://eu.cloud.example.com"),
            ("TALLY_SYNC_INTERVAL_MS", "1000"),
            ("TALLY_RETRY_DELAY_MS", "soon"),
            ("TALLY_DB_PATH", "/tmp/override.db"),
        ]);

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.cloud_url(), "https://eu.cloud.example.com");
        assert_eq!(config.sync.interval_ms, 1000);
        assert_eq!(config.sync.retry_delay_ms, 5000);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/override.db"));
    }

    #[test]
    fn test_load_from_file_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(
            &path,
            "[cloud]\nbase_url = \"https://cloud.example.com\"\n\n[sync]\ninterval_ms = 15000\n",
        )
        .unwrap();

        let config = SyncConfig::load(Some(path)).unwrap();

        assert_eq!(config.cloud.base_url, "https://cloud.example.com");
        assert_eq!(config.cloud.connect_timeout_secs, 10);
        assert_eq!(config.sync.interval_ms, 15000);
        assert_eq!(config.sync.batch_size, 10);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tally.toml");

        let mut config = SyncConfig::default();
        config.sync.startup_delay_ms = 500;
        config.database.path = Some(dir.path().join("pos.db"));
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[cloud]"));
        assert!(contents.contains("[sync]"));

        let loaded = SyncConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.sync.startup_delay_ms, 500);
        assert_eq!(loaded.database_path(), dir.path().join("pos.db"));
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "[sync]\nbatch_size = 0\n").unwrap();

        let err = SyncConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));

        std::fs::write(&path, "[cloud]\nbase_url = \"ftp://cloud.example.com\"\n").unwrap();
        let err = SyncConfig::load(Some(path.clone())).unwrap_err();
        assert!(err.is_config_error());

        assert_eq!(SyncConfig::load_or_default(Some(path)).sync.batch_size, 10);
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "[sync\ninterval_ms = ").unwrap();

        let err = SyncConfig::load(Some(path)).unwrap_err();
        assert!(matches!(err, SyncError::ConfigLoadFailed(_)));
    }
}
