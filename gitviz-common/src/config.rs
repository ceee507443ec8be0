//! Bootstrap configuration and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "GITVIZ_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the database and cloned repositories
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// GitHub API token used for listing and authenticated clones
    #[serde(default)]
    pub github_token: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bulk import tuning
    #[serde(default)]
    pub bulk_import: BulkImportToml,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Optional bulk import overrides; unset fields fall back to compiled defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkImportToml {
    pub max_concurrent_clones: Option<usize>,
    pub assumed_repo_size_mb: Option<u64>,
    pub github_api_url: Option<String>,
    pub expiry_minutes: Option<u64>,
}

/// Load TOML config, degrading to defaults when the file is missing or invalid
pub fn load_toml_config(path: &Path) -> TomlConfig {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<TomlConfig>(&content) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Invalid TOML in {}: {}. Using defaults", path.display(), e);
                TomlConfig::default()
            }
        },
        Err(e) => {
            warn!("Could not read {}: {}. Using defaults", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Default config file location (`~/.config/gitviz/gitviz-import.toml` on Linux)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("gitviz").join("gitviz-import.toml"))
        .unwrap_or_else(|| PathBuf::from("gitviz-import.toml"))
}

/// Resolve the root folder following the priority order above
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gitviz"))
        .unwrap_or_else(|| PathBuf::from("./gitviz_data"))
}

/// Creates the root folder layout on startup
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create root and repositories directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.repos_path())?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("gitviz.db")
    }

    /// Directory cloned repositories are written into
    pub fn repos_path(&self) -> PathBuf {
        self.root.join("repos")
    }
}
