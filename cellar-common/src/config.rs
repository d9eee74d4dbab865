//! Bootstrap configuration loading and root folder resolution
//!
//! Root folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CELLAR_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never aborts startup: the module logs a
//! warning and continues with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CELLAR_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "cellar.db";

/// Bootstrap configuration loaded from `~/.config/cellar/<module>.toml`
///
/// Only settings needed before the database is open live here. Anything the
/// running service can change is stored in the `settings` table instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Google Cloud Vision API key (label text detection)
    #[serde(default)]
    pub vision_api_key: Option<String>,

    /// OpenAI API key (transcription and tasting-note analysis)
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// AI pipeline tuning; every field falls back to a built-in default
    #[serde(default)]
    pub ai: AiTuning,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Optional overrides for the AI pipeline, `[ai]` table in the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiTuning {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub cache_enabled: Option<bool>,
    pub rate_limit_enabled: Option<bool>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_min_confidence: Option<u8>,
    pub session_timeout_ms: Option<u64>,
    pub vision_per_minute: Option<u32>,
    pub vision_per_day: Option<u32>,
    pub language_per_minute: Option<u32>,
    pub language_per_day: Option<u32>,
    pub transcription_model: Option<String>,
    pub analysis_model: Option<String>,
}

/// Resolves the root folder for one module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
        }
    }

    /// Highest-priority override, usually from `--root-folder`
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Resolve the root folder; never fails
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(path = %path, "Root folder from environment");
                return PathBuf::from(path);
            }
        }

        if let Some(path) = config_file_path(&self.module_name) {
            if let Ok(config) = load_toml_config(&path) {
                if let Some(root) = config.root_folder {
                    debug!(path = %root.display(), "Root folder from TOML config");
                    return root;
                }
            }
        }

        default_root_folder()
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Path of the per-module TOML file, if a config directory exists on this platform
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cellar").join(format!("{}.toml", module_name)))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load the module's TOML file, falling back to defaults when missing or invalid
pub fn load_module_config(module_name: &str) -> TomlConfig {
    let Some(path) = config_file_path(module_name) else {
        warn!("No config directory on this platform, using default configuration");
        return TomlConfig::default();
    };

    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{} - using default configuration", e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config atomically (temp file + rename)
///
/// On Unix the file is restricted to the owner (0600) because it may hold
/// provider API keys.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = target.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&temp_path, target)?;
    Ok(())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cellar"))
        .unwrap_or_else(|| PathBuf::from("./cellar_data"))
}
