//! Configuration for the budget ledger service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("budget-ledger")
}

/// Errors loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Configuration for a ledger service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Write policies
    #[serde(default)]
    pub policy: PolicyConfig,
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

impl LedgerConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load from a file; `.yaml`/`.yml` are read as YAML, anything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if is_yaml(path) {
            Ok(Self::from_yaml(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Save to a file, format chosen by extension like [`LedgerConfig::load`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            self.to_yaml()?
        } else {
            toml::to_string_pretty(self)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database_file)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_database_file() -> String {
    "ledger.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
        }
    }
}

/// What deleting a node with dependents does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse while children or progress entries exist
    #[default]
    Restrict,
    /// Remove the whole subtree and its progress entries
    Cascade,
}

/// Write policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub delete_policy: DeletePolicy,
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Currency symbol for formatted amounts
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable audit logging
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
    /// Maximum audit entries kept in memory
    #[serde(default = "default_audit_max_entries")]
    pub audit_max_entries: usize,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_audit_max_entries() -> usize {
    10_000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            log_level: default_log_level(),
            audit_enabled: true,
            audit_max_entries: default_audit_max_entries(),
        }
    }
}
