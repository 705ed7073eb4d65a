/// Embedding provider trait with local FastEmbed and remote HTTP implementations
use crate::retry::RateLimitSignal;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding service is rate limiting requests")]
    RateLimited,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API returned status {status}: {body}")]
    Api { status: u16, body: String },
}

impl RateLimitSignal for EmbeddingError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, EmbeddingError::RateLimited)
    }
}

/// Trait for embedding providers
///
/// Output vectors are positionally aligned with the input texts, and every
/// vector from one provider has the same length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    /// Generate embeddings for multiple texts in one call
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embedding dimension, if already known
    fn dimension(&self) -> Option<usize>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

fn reject_empty(texts: &[String]) -> Result<(), EmbeddingError> {
    if let Some(position) = texts.iter().position(|t| t.is_empty()) {
        return Err(EmbeddingError::InvalidInput(format!(
            "Empty text at position {}",
            position
        )));
    }
    Ok(())
}

/// FastEmbed provider for local embedding generation
///
/// The model is loaded on the first embedding request and shared by every
/// later call on this provider.
pub struct FastEmbedProvider {
    model: OnceCell<Arc<TextEmbedding>>,
    embedding_model: EmbeddingModel,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a provider for the named model without loading it yet
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use. The smallest model (all-MiniLM-L6-v2) is ~90MB.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        Ok(Self {
            model: OnceCell::new(),
            embedding_model,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    /// Whether the model has been loaded
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!(
                    "Loading embedding model: {} ({}D)",
                    self.model_name,
                    self.dimension
                );

                let options = InitOptions::new(self.embedding_model.clone())
                    .with_show_download_progress(true);

                let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await
                    .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?
                    .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

                Ok::<_, EmbeddingError>(Arc::new(model))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_empty(texts)?;

        let model = self.model().await?;
        let batch = texts.to_vec();

        let embeddings = tokio::task::spawn_blocking(move || model.embed(batch, None))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Provider for OpenAI-compatible `/embeddings` endpoints
///
/// The dimension is learned from the first response; later responses of a
/// different length are rejected.
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    dimension: OnceLock<usize>,
}

impl fmt::Debug for RemoteEmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension.get())
            .finish()
    }
}

impl RemoteEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, model_name: &str, api_key: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model_name: model_name.to_string(),
            dimension: OnceLock::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_empty(texts)?;

        let body = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Embedding API error {status}: {body}");
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        let expected = *self.dimension.get_or_init(|| embeddings[0].len());
        for embedding in &embeddings {
            if embedding.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        tracing::debug!(
            "Embedded {} texts with {} ({}D)",
            embeddings.len(),
            self.model_name,
            expected
        );

        Ok(embeddings)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
