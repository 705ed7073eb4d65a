mod batch;
/// Embedding & Indexing
///
/// This module turns evidence text into vectors and answers nearest-neighbour
/// queries over them.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - RemoteEmbeddingProvider for OpenAI-compatible embedding APIs
/// - BatchEmbedder for batched calls under rate-limit backoff
/// - VectorIndex for exact L2 search
mod provider;
mod vector_index;

pub use batch::BatchEmbedder;
pub use provider::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, RemoteEmbeddingProvider,
};
pub use vector_index::{Neighbor, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use crate::error::{CasefileError, Result};
use std::sync::Arc;

/// Construct the provider named by the configuration
///
/// Local models are not loaded here; that happens on the first embedding
/// request.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = FastEmbedProvider::new(&config.model)?;
            Ok(Arc::new(provider))
        }
        "remote" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.is_empty());
            if api_key.is_none() {
                tracing::warn!(
                    "{} is not set; calling {} without credentials",
                    config.api_key_env,
                    config.base_url
                );
            }
            Ok(Arc::new(RemoteEmbeddingProvider::new(
                config.base_url.clone(),
                &config.model,
                api_key,
            )))
        }
        other => Err(CasefileError::InvalidConfigValue {
            path: "embedding.provider".to_string(),
            message: format!("Unknown embedding provider '{}'", other),
        }),
    }
}
