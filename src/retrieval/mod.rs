//! Retrieval pipeline
//!
//! Builds the vector store from evidence chunks and answers queries with the
//! nearest chunks and the files they came from.

mod pipeline;

pub use pipeline::{BuildReport, Retriever};

use serde::{Deserialize, Serialize};

/// A retrieved chunk with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    /// Chunk text
    pub text: String,

    /// Evidence file the chunk belongs to
    pub source: String,

    /// Squared L2 distance to the query (lower is nearer)
    pub distance: f32,
}

/// Hits ranked nearest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<EvidenceHit>,
}

impl SearchResult {
    pub fn new(hits: Vec<EvidenceHit>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceHit> {
        self.hits.iter()
    }

    /// `(text, source)` pairs in rank order
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.hits
            .iter()
            .map(|hit| (hit.text.as_str(), hit.source.as_str()))
            .collect()
    }
}

impl IntoIterator for SearchResult {
    type Item = EvidenceHit;
    type IntoIter = std::vec::IntoIter<EvidenceHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}
