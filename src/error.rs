use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::generation::GenerationError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Casefile
#[derive(Error, Debug)]
pub enum CasefileError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Chunk parameters that would never advance or produce degenerate chunks
    #[error("Invalid chunking parameters: chunk_size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    /// Vectors of different dimensionality met in one store
    #[error("Embedding dimension mismatch: store has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Store was built by a different embedding model than the active one
    #[error("Store was built with embedding model '{store_model}' but the active model is '{active_model}'; rebuild the store")]
    ProviderMismatch {
        store_model: String,
        active_model: String,
    },

    /// No store has been built at this location yet
    #[error("Vector store not found: {path}")]
    StoreNotFound { path: PathBuf },

    /// Store exists but cannot be trusted
    #[error("Vector store is corrupt at {path}: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    /// Remote service kept rate limiting during a non-interactive operation
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Answer generation errors
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<VectorIndexError> for CasefileError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::DimensionMismatch { expected, actual } => {
                CasefileError::DimensionMismatch { expected, actual }
            }
            other => CasefileError::Other(anyhow::Error::new(other)),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Casefile operations
pub type Result<T> = std::result::Result<T, CasefileError>;
