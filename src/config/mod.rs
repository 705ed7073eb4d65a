//! Configuration management for Casefile
//!
//! Loads the TOML configuration, applies profile and environment overrides,
//! and validates the result before anything else runs.

use crate::error::{CasefileError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Schema version written by `casefile config init`
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where evidence is read from and the store is written to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Store file name, relative to `data_dir`
    pub store_file: String,
    /// Evidence directory; relative paths resolve against `data_dir`
    pub evidence_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" or "remote"
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
    /// Base URL of an OpenAI-compatible embeddings API
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

/// Backoff for rate-limited remote calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Duration string such as "5s" or "500ms"
    pub base_delay: String,
}

impl RetryConfig {
    /// Build the runtime policy
    pub fn policy(&self) -> Result<RetryPolicy> {
        let base_delay =
            parse_duration(&self.base_delay).ok_or_else(|| CasefileError::InvalidConfigValue {
                path: "retry.base_delay".to_string(),
                message: format!("Invalid duration format: {}", self.base_delay),
            })?;
        Ok(RetryPolicy::new(self.max_retries, base_delay))
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    /// Turns of chat history kept and sent with each question
    pub history_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "gemini".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            history_turns: 5,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_enabled: Option<bool>,
}

/// Parse "250ms", "5s", "2m", "1h" or a bare number of seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => s.split_at(split),
        None => (s, "s"),
    };
    let value: u64 = number.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CasefileError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file at `path`, or the default path, falling back to defaults
    /// when no file exists at the default location
    pub fn load_or_default(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Self::default_path()?;
                if default_path.exists() {
                    Self::load(&default_path)?
                } else {
                    tracing::debug!("No config at {:?}, using defaults", default_path);
                    let mut config = Self::default();
                    config.apply_env_overrides();
                    ConfigValidator::validate(&config)?;
                    config
                }
            }
        };

        if let Some(profile) = profile {
            config.apply_profile(profile)?;
            ConfigValidator::validate(&config)?;
        }

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| CasefileError::Config(format!("Unknown profile '{}'", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CASEFILE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `CASEFILE_`-prefixed overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("CASEFILE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__EVIDENCE_DIR" => self.storage.evidence_dir = PathBuf::from(value),
            "CHUNKING__CHUNK_SIZE" => self.chunking.chunk_size = parse_value(path, value)?,
            "CHUNKING__OVERLAP" => self.chunking.overlap = parse_value(path, value)?,
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "EMBEDDING__BASE_URL" => self.embedding.base_url = value.to_string(),
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_value(path, value)?,
            "RETRY__MAX_RETRIES" => self.retry.max_retries = parse_value(path, value)?,
            "RETRY__BASE_DELAY" => self.retry.base_delay = value.to_string(),
            "LLM__ENABLED" => self.llm.enabled = parse_value(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    /// Resolved path of the persisted vector store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.store_file)
    }

    /// Resolved evidence directory
    pub fn evidence_dir(&self) -> PathBuf {
        let dir = expand_path(&self.storage.evidence_dir);
        if dir.is_absolute() {
            dir
        } else {
            self.data_dir().join(dir)
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            CasefileError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("casefile").join("config.toml"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| CasefileError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.casefile"),
                store_file: "vector_store.zst".to_string(),
                evidence_dir: PathBuf::from("evidence"),
            },
            chunking: ChunkingConfig {
                chunk_size: 500,
                overlap: 50,
            },
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig { top_k: 3 },
            retry: RetryConfig {
                max_retries: 3,
                base_delay: "5s".to_string(),
            },
            llm: LlmConfig::default(),
            profiles: HashMap::new(),
        }
    }
}
