/// Batched embedding with rate-limit backoff
use super::{EmbeddingError, EmbeddingProvider};
use crate::retry::{with_retry, RetryOutcome, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, info};

/// Splits texts into provider-sized batches and embeds them in order
///
/// Each batch is one provider call and one unit of retry. The concatenated
/// output is identical whatever the batch size.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl BatchEmbedder {
    /// Create a new batch embedder
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `batch_size` - Number of texts per provider call (0 is treated as 1)
    /// * `retry` - Backoff policy for rate-limited calls
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed all texts, returning vectors aligned with the input
    ///
    /// Stops at the first batch whose retries are exhausted.
    pub async fn embed_all(
        &self,
        texts: &[String],
    ) -> Result<RetryOutcome<Vec<Vec<f32>>>, EmbeddingError> {
        let start = std::time::Instant::now();
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            let outcome = with_retry(&self.retry, "Embedding batch", || {
                self.provider.embed_batch(batch)
            })
            .await?;

            let vectors = match outcome {
                RetryOutcome::Succeeded(vectors) => vectors,
                RetryOutcome::Exhausted { attempts } => {
                    return Ok(RetryOutcome::Exhausted { attempts });
                }
            };

            if vectors.len() != batch.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            debug!("Embedded batch {} ({} texts)", batch_number + 1, batch.len());
            embeddings.extend(vectors);
        }

        info!(
            "Embedded {} texts in {}ms",
            embeddings.len(),
            start.elapsed().as_millis()
        );

        Ok(RetryOutcome::Succeeded(embeddings))
    }

    /// Embed a single query as a one-item batch
    pub async fn embed_query(
        &self,
        query: &str,
    ) -> Result<RetryOutcome<Vec<f32>>, EmbeddingError> {
        let texts = [query.to_string()];
        let outcome = self.embed_all(&texts).await?;

        match outcome {
            RetryOutcome::Succeeded(mut vectors) => vectors
                .pop()
                .map(RetryOutcome::Succeeded)
                .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string())),
            RetryOutcome::Exhausted { attempts } => Ok(RetryOutcome::Exhausted { attempts }),
        }
    }
}
