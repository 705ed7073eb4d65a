//! Evidence ingestion
//!
//! Reads evidence files from disk and cuts them into overlapping chunks,
//! each tagged with the file it came from.

mod chunker;

pub use chunker::{chunk_text, validate_params};

use crate::error::{CasefileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A raw evidence document before chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    /// Full text of the document
    pub content: String,
    /// File name the document was read from
    pub source: String,
}

impl EvidenceDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// A bounded piece of one evidence document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub text: String,
    pub source: String,
}

impl EvidenceChunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Load every `.txt` file directly inside `dir`
///
/// Documents are ordered by file name so that repeated ingestion of the same
/// directory produces the same chunk sequence. A missing directory is logged
/// and treated as holding no evidence.
pub fn load_evidence(dir: &Path) -> Result<Vec<EvidenceDocument>> {
    if !dir.exists() {
        tracing::warn!("Evidence directory not found: {}", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| CasefileError::Io {
        source: e,
        context: format!("Failed to read evidence directory: {}", dir.display()),
    })?;

    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to list evidence directory: {}", dir.display()),
        })?;
        let path = entry.path();

        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }

        let source = entry.file_name().to_string_lossy().into_owned();
        let content = std::fs::read_to_string(&path).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to read evidence file: {}", path.display()),
        })?;

        documents.push(EvidenceDocument { content, source });
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));

    tracing::info!(
        "Loaded {} evidence files from {}",
        documents.len(),
        dir.display()
    );

    Ok(documents)
}

/// Chunk each document in order, tagging chunks with their document's source
pub fn chunk_documents(
    documents: &[EvidenceDocument],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<EvidenceChunk>> {
    validate_params(chunk_size, overlap)?;

    let mut chunks = Vec::new();
    for document in documents {
        for text in chunk_text(&document.content, chunk_size, overlap)? {
            chunks.push(EvidenceChunk {
                text,
                source: document.source.clone(),
            });
        }
    }

    tracing::debug!(
        "Chunked {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );

    Ok(chunks)
}
