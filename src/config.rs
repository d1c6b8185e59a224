/// Configuration management for the authority CLI and embedders.
///
/// Configuration is stored at: `$USER_HOME/.authority/config.json`
use crate::error::{AuthorityError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// A check in a declared permission set: either a bare name or a name with
/// a verbose label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
    },
}

/// Declarative permission set, registered at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSetConfig {
    pub name: String,

    /// Explicit label; derived from `name` when absent
    #[serde(default)]
    pub label: Option<String>,

    /// Model label, e.g. "flatpages.flatpage"
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Memoize grant lookups per resolver instead of querying per check
    #[serde(default = "default_smart_cache")]
    pub use_smart_cache: bool,

    #[serde(default)]
    pub permission_sets: Vec<PermissionSetConfig>,
}

fn default_database_path() -> String {
    dirs::home_dir()
        .map(|home| home.join(".authority").join("authority.db"))
        .unwrap_or_else(|| PathBuf::from("authority.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_smart_cache() -> bool {
    true
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            use_smart_cache: default_smart_cache(),
            permission_sets: Vec::new(),
        }
    }
}

/// Get the path to the config file
///
/// Returns: `$USER_HOME/.authority/config.json`
/// Respects the `AUTHORITY_CONFIG_PATH` environment variable.
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AUTHORITY_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home_dir = dirs::home_dir()
        .ok_or_else(|| AuthorityError::Config("Failed to get user home directory".to_string()))?;
    Ok(home_dir.join(".authority").join("config.json"))
}

/// Load configuration from disk
///
/// If the config file doesn't exist, creates a new one with default values.
pub fn load_config() -> Result<AuthorityConfig> {
    let config_path = get_config_path()?;

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .map_err(|e| AuthorityError::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| AuthorityError::Config(format!("Failed to parse config file: {}", e)))
    } else {
        let config = AuthorityConfig::default();
        save_config(&config)?;
        Ok(config)
    }
}

/// Save configuration to disk
///
/// Creates the `.authority` directory if it doesn't exist.
pub fn save_config(config: &AuthorityConfig) -> Result<()> {
    let config_path = get_config_path()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AuthorityError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AuthorityError::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(&config_path, content)
        .map_err(|e| AuthorityError::Config(format!("Failed to write config file: {}", e)))?;

    Ok(())
}
