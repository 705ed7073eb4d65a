//! Store building and nearest-chunk search

use crate::embedding::{BatchEmbedder, VectorIndex};
use crate::error::{CasefileError, Result};
use crate::ingest::EvidenceChunk;
use crate::retrieval::{EvidenceHit, SearchResult};
use crate::retry::RetryOutcome;
use crate::store::Store;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary of a store build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub chunks: usize,
    pub dimension: usize,
    pub fingerprint: String,
    pub duration_ms: u64,
}

/// Owns the store location and the embedder used to fill and query it
///
/// Builds are serialized through an internal lock. Searches read the store
/// file directly and rely on the atomic replace in [`Store::save`].
pub struct Retriever {
    embedder: BatchEmbedder,
    store_path: PathBuf,
    build_lock: Mutex<()>,
}

impl Retriever {
    pub fn new(embedder: BatchEmbedder, store_path: PathBuf) -> Self {
        Self {
            embedder,
            store_path,
            build_lock: Mutex::new(()),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Load the current store
    pub fn load_store(&self) -> Result<Store> {
        Store::load(&self.store_path)
    }

    /// Embed `chunks`, index them and replace the persisted store
    ///
    /// Empty input produces a valid empty store. After saving, the store is
    /// read back once and any failure to do so is returned as an error.
    pub async fn build_store(&self, chunks: Vec<EvidenceChunk>) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        let start = std::time::Instant::now();
        let provider = self.embedder.provider();
        let model = provider.model_name().to_string();

        info!("Building vector store from {} chunks", chunks.len());

        let store = if chunks.is_empty() {
            Store::empty(&model, provider.dimension().unwrap_or(0))
        } else {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_all(&texts).await?.into_result()?;

            if let Some(expected) = provider.dimension() {
                if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                    return Err(CasefileError::DimensionMismatch {
                        expected,
                        actual: bad.len(),
                    });
                }
            }

            let index = VectorIndex::build(&vectors)?;
            Store::new(&model, index, chunks)?
        };

        store.save(&self.store_path)?;

        let saved = Store::load(&self.store_path)?;
        if saved.manifest().fingerprint != store.manifest().fingerprint {
            return Err(CasefileError::StoreCorrupt {
                path: self.store_path.clone(),
                reason: "store read back with a different fingerprint".to_string(),
            });
        }

        let report = BuildReport {
            chunks: saved.len(),
            dimension: saved.manifest().dimension,
            fingerprint: saved.manifest().fingerprint.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Vector store built: {} chunks, {}D, {}ms",
            report.chunks, report.dimension, report.duration_ms
        );

        Ok(report)
    }

    /// Up to `k` chunks nearest to `query`, nearest first
    ///
    /// A missing or corrupt store, or a blank query, yields no hits. A store
    /// built with a different embedding model, or vectors of a different
    /// dimension, is a configuration error.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetryOutcome<SearchResult>> {
        let store = match Store::load(&self.store_path) {
            Ok(store) => store,
            Err(CasefileError::StoreNotFound { path }) => {
                warn!(
                    "Vector store not found at {}; build it with `casefile ingest`",
                    path.display()
                );
                return Ok(RetryOutcome::Succeeded(SearchResult::default()));
            }
            Err(e @ CasefileError::StoreCorrupt { .. }) => {
                warn!("{e}; answering without evidence");
                return Ok(RetryOutcome::Succeeded(SearchResult::default()));
            }
            Err(e) => return Err(e),
        };

        if store.is_empty() || k == 0 {
            debug!("Store is empty; no evidence to search");
            return Ok(RetryOutcome::Succeeded(SearchResult::default()));
        }

        if query.trim().is_empty() {
            debug!("Blank query; nothing to search for");
            return Ok(RetryOutcome::Succeeded(SearchResult::default()));
        }

        let active_model = self.embedder.provider().model_name();
        if store.manifest().model != active_model {
            return Err(CasefileError::ProviderMismatch {
                store_model: store.manifest().model.clone(),
                active_model: active_model.to_string(),
            });
        }

        let query_vector = match self.embedder.embed_query(query).await? {
            RetryOutcome::Succeeded(vector) => vector,
            RetryOutcome::Exhausted { attempts } => {
                return Ok(RetryOutcome::Exhausted { attempts });
            }
        };

        let neighbors = store.index().search(&query_vector, k)?;

        let mut hits = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match store.get(neighbor.position) {
                Some((text, source)) => hits.push(EvidenceHit {
                    text: text.to_string(),
                    source: source.to_string(),
                    distance: neighbor.distance,
                }),
                None => warn!(
                    "Dropping search hit at position {} outside the store",
                    neighbor.position
                ),
            }
        }

        debug!("Found {} hits for query", hits.len());
        Ok(RetryOutcome::Succeeded(SearchResult::new(hits)))
    }
}
