//! Runtime settings: a TOML file plus environment overrides.
//!
//! The API key is read from `MARKETSTACK_API_KEY` first and from the
//! `[marketstack]` table of the config file second.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable carrying the MarketStack access key.
pub const API_KEY_ENV: &str = "MARKETSTACK_API_KEY";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_BASE_URL: &str = "http://api.marketstack.com/v1";

/// Symbols the validator accepts unless the config file says otherwise.
pub const DEFAULT_ALLOWED_SYMBOLS: &[&str] =
    &["AAPL", "MSFT", "AMZN", "GOOGL", "META", "NVDA", "TSLA"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no MarketStack API key: set MARKETSTACK_API_KEY or [marketstack].api_key in the config file")]
    MissingApiKey,
}

/// On-disk layout of `config.toml`. Every table and key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub marketstack: MarketStackSection,
    pub storage: StorageSection,
    pub validation: ValidationSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketStackSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationSection {
    pub allowed_symbols: Option<Vec<String>>,
}

impl FileConfig {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub page_limit: u32,
    pub allowed_symbols: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from("data/raw"),
            request_timeout_secs: 30,
            page_limit: 1000,
            allowed_symbols: DEFAULT_ALLOWED_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `config.toml` if present) and the environment.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(read_file(p)?),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Some(read_file(default)?)
                } else {
                    None
                }
            }
        };

        let mut settings = Self::from_file_config(file.unwrap_or_default());
        settings.apply_env_key(std::env::var(API_KEY_ENV).ok());
        Ok(settings)
    }

    pub fn from_file_config(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            api_key: file.marketstack.api_key.filter(|k| !k.trim().is_empty()),
            base_url: file.marketstack.base_url.unwrap_or(defaults.base_url),
            data_dir: file.storage.data_dir.unwrap_or(defaults.data_dir),
            request_timeout_secs: file
                .marketstack
                .timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            page_limit: file.marketstack.limit.unwrap_or(defaults.page_limit),
            allowed_symbols: file
                .validation
                .allowed_symbols
                .unwrap_or(defaults.allowed_symbols),
        }
    }

    /// A non-empty environment key replaces whatever the file said.
    pub fn apply_env_key(&mut self, key: Option<String>) {
        if let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
    }

    /// The API key, or an error when none was configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml(&content, path)
}
