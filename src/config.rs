//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\audioshelf\config.toml
//! - macOS: ~/Library/Application Support/audioshelf/config.toml
//! - Linux: ~/.config/audioshelf/config.toml
//!
//! Every section is optional; missing keys take their defaults. Command-line
//! flags override whatever is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::organizer::{TransferMode, UndoJournal};
use crate::queue::RetryPolicy;
use crate::scanner::DEFAULT_EXTENSIONS;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub matching: MatchingConfig,
    pub organize: OrganizeConfig,
    pub queue: QueueConfig,
    pub provider: ProviderConfig,
}

/// Directory scanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Deepest level walked below the root (files in the root are depth 1)
    pub max_depth: usize,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    /// Bytes
    pub min_size: u64,
    /// Bytes
    pub max_size: u64,
    /// Extensions without the dot
    pub extensions: Vec<String>,
    /// Plain strings match by containment, `re:`-prefixed strings are regexes
    pub exclude: Vec<String>,
    /// Emit a progress event every this many files
    pub progress_interval: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            include_hidden: false,
            follow_symlinks: false,
            min_size: 1024,
            max_size: 10 * 1024 * 1024 * 1024,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            exclude: Vec::new(),
            progress_interval: 100,
        }
    }
}

/// Candidate selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Lowest score accepted as a match
    pub min_confidence: f64,
    /// Results requested per search
    pub search_limit: u32,
    /// Read embedded tags to improve the search query
    pub use_tags: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            search_limit: 10,
            use_tags: true,
        }
    }
}

/// Replacement template strings for the built-in layouts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub series: Option<String>,
    pub non_series: Option<String>,
    pub single_file: Option<String>,
    pub multi_file: Option<String>,
}

/// File organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeConfig {
    /// Library root
    pub destination: Option<PathBuf>,
    pub mode: TransferMode,
    /// Organize books without an accepted match using their local identity
    pub organize_unmatched: bool,
    /// Write tags from the accepted match into the transferred files
    pub write_tags: bool,
    pub templates: TemplateConfig,
    /// Undo journal location (defaults to the user data directory)
    pub journal: Option<PathBuf>,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            destination: None,
            mode: TransferMode::DryRun,
            organize_unmatched: true,
            write_tags: false,
            templates: TemplateConfig::default(),
            journal: None,
        }
    }
}

impl OrganizeConfig {
    pub fn journal_path(&self) -> PathBuf {
        self.journal.clone().unwrap_or_else(UndoJournal::default_path)
    }
}

/// Concurrency and retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent provider requests
    pub provider_concurrency: usize,
    /// Concurrent file transfers
    pub file_concurrency: usize,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider_concurrency: 3,
            file_concurrency: 2,
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
        }
    }
}

/// Metadata provider endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Audible marketplace: us, uk, ca, au, de, fr, it, es, in, jp
    pub region: String,
    /// Overrides the regional catalog host
    pub catalog_base_url: Option<String>,
    pub audnexus_base_url: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: "us".to_string(),
            catalog_base_url: None,
            audnexus_base_url: "https://api.audnex.us".to_string(),
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("audioshelf"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit file
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
