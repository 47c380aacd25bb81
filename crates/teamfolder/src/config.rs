//! Configuration management for teamfolder.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Role;
use crate::roster::{MergeOptions, WriteMode};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "teamfolder";

/// Default identity file name.
const IDENTITY_FILE_NAME: &str = "identity.json";

/// Roster document format version written by this client.
pub const ROSTER_FORMAT_VERSION: &str = "1.0";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TEAMFOLDER_`)
/// 2. TOML config file at `~/.config/teamfolder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local identity configuration.
    pub identity: IdentityConfig,
    /// Team folder layout.
    pub folders: FolderConfig,
    /// Roster write behavior.
    pub roster: RosterConfig,
    /// Data-sync hook configuration.
    pub sync: SyncConfig,
}

/// Identity-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the identity document.
    /// Defaults to `~/.local/share/teamfolder/identity.json`
    pub path: Option<PathBuf>,
}

/// Team folder layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    /// Reserved collaboration metadata subfolder.
    pub metadata_dir: String,
    /// Roster document name inside the metadata subfolder.
    pub roster_file: String,
    /// Record-storage subfolders created at bootstrap.
    pub domain_subfolders: Vec<String>,
}

/// Roster write behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Merge onto the on-disk roster before replacing it.
    /// When false, the last writer wins and concurrent joins can be lost.
    pub merge_on_write: bool,
    /// Write attempts before reporting a conflict.
    pub max_write_attempts: u32,
    /// Base delay between write attempts in milliseconds.
    pub retry_backoff_ms: u64,
    /// How long a writer waits for another client's roster lock, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Age in milliseconds after which a roster lock or staging file left by
    /// a crashed client is removed.
    pub stale_lock_ms: u64,
    /// Treat an unparseable roster as absent instead of reporting it.
    pub lenient_parse: bool,
    /// Role given to members who join an existing team.
    pub default_member_role: Role,
}

/// Data-sync hook configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Push local records into the team folder after joining or converting.
    pub enabled: bool,
    /// Directory holding local records, laid out by domain subfolder.
    pub local_records_dir: Option<PathBuf>,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            metadata_dir: ".teamfolder".to_string(),
            roster_file: "roster.json".to_string(),
            domain_subfolders: default_domain_subfolders(),
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            merge_on_write: true,
            max_write_attempts: 5,
            retry_backoff_ms: 50,
            lock_timeout_ms: 10_000,
            stale_lock_ms: 30_000,
            lenient_parse: false,
            default_member_role: Role::Recruiter,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_records_dir: None,
        }
    }
}

/// Default record-storage subfolders.
fn default_domain_subfolders() -> Vec<String> {
    [
        "records",
        "projects",
        "interviews",
        "tasks",
        "templates",
        "exports",
        "backups",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Check that a configured name is a single, plain path component.
fn validate_name(field: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if name.trim().is_empty() || !single || name.contains(['/', '\\']) {
        return Err(Error::ConfigValidation {
            message: format!("{field} must be a single folder or file name, got '{name}'"),
        });
    }
    Ok(())
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `TEAMFOLDER_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("TEAMFOLDER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        validate_name("folders.metadata_dir", &self.folders.metadata_dir)?;
        validate_name("folders.roster_file", &self.folders.roster_file)?;

        if self.folders.domain_subfolders.is_empty() {
            return Err(Error::ConfigValidation {
                message: "folders.domain_subfolders must not be empty".to_string(),
            });
        }

        for (i, name) in self.folders.domain_subfolders.iter().enumerate() {
            validate_name("folders.domain_subfolders", name)?;

            if *name == self.folders.metadata_dir {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "metadata_dir '{name}' must differ from every domain subfolder"
                    ),
                });
            }

            if self.folders.domain_subfolders[..i].contains(name) {
                return Err(Error::ConfigValidation {
                    message: format!("duplicate domain subfolder '{name}'"),
                });
            }
        }

        if self.roster.max_write_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "max_write_attempts must be greater than 0".to_string(),
            });
        }

        if self.roster.lock_timeout_ms == 0 || self.roster.stale_lock_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "lock_timeout_ms and stale_lock_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the identity document path, resolving defaults if not set.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.identity
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(IDENTITY_FILE_NAME))
    }

    /// Get the roster write retry backoff as a Duration.
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.roster.retry_backoff_ms)
    }

    /// Get the roster write mode.
    #[must_use]
    pub fn write_mode(&self) -> WriteMode {
        if self.roster.merge_on_write {
            WriteMode::Merge(MergeOptions {
                max_attempts: self.roster.max_write_attempts,
                backoff: self.retry_backoff(),
                lock_timeout: Duration::from_millis(self.roster.lock_timeout_ms),
                stale_after: Duration::from_millis(self.roster.stale_lock_ms),
            })
        } else {
            WriteMode::Overwrite
        }
    }
}
