
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const DEFAULT_DATA_DIR: &str = "./data/rag";
pub const DEFAULT_LOCAL_DIMENSIONS: usize = 384;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderMode,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub api: ApiConfig,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

/// Embedding backend selection policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    Auto,
    Remote,
    Local,
}

impl FromStr for ProviderMode {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ProviderMode::Auto),
            "remote" => Ok(ProviderMode::Remote),
            "local" => Ok(ProviderMode::Local),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderMode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ProviderMode::Auto => write!(f, "auto"),
            ProviderMode::Remote => write!(f, "remote"),
            ProviderMode::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for RemoteConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    pub model: String,
    pub dimensions: usize,
}

impl Default for LocalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: "hash-embed-v1".to_string(),
            dimensions: DEFAULT_LOCAL_DIMENSIONS,
        }
    }
}

/// Admin query endpoint toggle. The query surface is an authoring-time tool
/// and stays disabled in production deployments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider mode: {0} (must be 'auto', 'remote' or 'local')")]
    InvalidProvider(String),
    #[error("Invalid remote base URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid local embedding dimensions: {0} (must be between 64 and 4096)")]
    InvalidDimensions(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            provider: ProviderMode::default(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            api: ApiConfig::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// Resolve the storage directory: CLI flag, then `LEXI_RAG_DATA_DIR`, then
/// the default relative path.
#[inline]
pub fn resolve_data_dir(cli_override: Option<PathBuf>) -> PathBuf {
    cli_override
        .or_else(|| std::env::var("LEXI_RAG_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

impl Config {
    /// Load configuration from `config.toml` inside the data directory,
    /// falling back to defaults when the file does not exist, then apply
    /// environment overrides and validate.
    #[inline]
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };
        config.data_dir = data_dir.as_ref().to_path_buf();

        config.apply_overrides(std::env::vars())?;
        config.validate().context("Configuration validation failed")?;

        Ok(config)
    }

    /// Apply environment-style overrides from an arbitrary source of
    /// key/value pairs.
    #[inline]
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "LEXI_RAG_PROVIDER" => self.provider = value.parse()?,
                "OLLAMA_BASE_URL" => self.remote.base_url = value,
                "OLLAMA_EMBEDDING_MODEL" => self.remote.model = value,
                "LEXI_RAG_LOCAL_MODEL" => self.local.model = value,
                "LEXI_RAG_LOCAL_DIMENSIONS" => {
                    let dims: usize = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidDimensions(0))?;
                    self.local.dimensions = dims;
                }
                "LEXI_RAG_ADMIN_API" => {
                    self.api.enabled = matches!(value.as_str(), "1" | "true" | "yes");
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.remote_base_url()?;

        if self.remote.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.remote.model.clone()));
        }
        if self.local.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.local.model.clone()));
        }
        if !(64..=4096).contains(&self.local.dimensions) {
            return Err(ConfigError::InvalidDimensions(self.local.dimensions));
        }

        Ok(())
    }

    #[inline]
    pub fn remote_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.remote.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.remote.base_url.clone()))
    }

    /// Path of the persisted vector index snapshot.
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    /// Path of the conversation history database.
    #[inline]
    pub fn conversations_db_path(&self) -> PathBuf {
        self.data_dir.join("assistant.db")
    }
}
