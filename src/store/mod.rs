//! Persisted vector store
//!
//! A store is the vector index plus two parallel arrays, chunk texts and
//! chunk metadata. Position `i` in each of the three describes the same
//! chunk. Stores are written whole: a rebuild replaces the file atomically and
//! every load re-checks that the three collections line up.

use crate::embedding::VectorIndex;
use crate::error::{CasefileError, Result};
use crate::ingest::EvidenceChunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk layout version
pub const STORE_FORMAT_VERSION: u32 = 1;

const COMPRESSION_LEVEL: i32 = 3;

/// Per-chunk metadata kept alongside the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Evidence file the chunk was cut from
    pub source: String,
}

/// Facts about how a store was built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    /// Embedding model that produced the vectors
    pub model: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    /// BLAKE3 digest of texts, sources and vectors
    pub fingerprint: String,
}

/// The index/documents/metadatas triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    manifest: StoreManifest,
    index: VectorIndex,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
}

impl Store {
    /// Assemble a store from an index and the chunks it was built from
    pub fn new(model: &str, index: VectorIndex, chunks: Vec<EvidenceChunk>) -> Result<Self> {
        let (documents, metadatas): (Vec<String>, Vec<ChunkMetadata>) = chunks
            .into_iter()
            .map(|chunk| (chunk.text, ChunkMetadata { source: chunk.source }))
            .unzip();

        let mut store = Self {
            manifest: StoreManifest {
                format_version: STORE_FORMAT_VERSION,
                model: model.to_string(),
                dimension: index.dimension(),
                built_at: Utc::now(),
                fingerprint: String::new(),
            },
            index,
            documents,
            metadatas,
        };

        if let Some(reason) = store.alignment_error() {
            return Err(CasefileError::Other(anyhow::anyhow!(
                "Cannot assemble store: {}",
                reason
            )));
        }

        store.manifest.fingerprint = store.compute_fingerprint();
        Ok(store)
    }

    /// A valid store with no entries
    pub fn empty(model: &str, dimension: usize) -> Self {
        let mut store = Self {
            manifest: StoreManifest {
                format_version: STORE_FORMAT_VERSION,
                model: model.to_string(),
                dimension,
                built_at: Utc::now(),
                fingerprint: String::new(),
            },
            index: VectorIndex::empty(dimension),
            documents: Vec::new(),
            metadatas: Vec::new(),
        };
        store.manifest.fingerprint = store.compute_fingerprint();
        store
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn metadatas(&self) -> &[ChunkMetadata] {
        &self.metadatas
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Text and source of the chunk at `position`
    pub fn get(&self, position: usize) -> Option<(&str, &str)> {
        let text = self.documents.get(position)?;
        let metadata = self.metadatas.get(position)?;
        Some((text.as_str(), metadata.source.as_str()))
    }

    /// Check whether a store file exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Write the store to `path`, replacing any previous store
    ///
    /// The bytes go to a sibling temporary file which is synced and then
    /// renamed over `path`, so readers see either the old store or the new
    /// one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CasefileError::Io {
                source: e,
                context: format!("Failed to create store directory: {}", parent.display()),
            })?;
        }

        let json = serde_json::to_vec(self).map_err(|e| CasefileError::Json {
            source: e,
            context: "Failed to serialize vector store".to_string(),
        })?;
        let compressed =
            zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| CasefileError::Io {
                source: e,
                context: "Failed to compress vector store".to_string(),
            })?;

        let temp_path = temp_path(path);
        let mut file = fs::File::create(&temp_path).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to create temp store file: {}", temp_path.display()),
        })?;
        file.write_all(&compressed).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to write store data: {}", temp_path.display()),
        })?;
        file.sync_all().map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to sync store file: {}", temp_path.display()),
        })?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(CasefileError::Io {
                source: e,
                context: format!(
                    "Failed to rename temp store to final location: {} -> {}",
                    temp_path.display(),
                    path.display()
                ),
            });
        }

        sync_parent_dir(path)?;

        tracing::info!(
            "Saved vector store ({} chunks, {}D) to {}",
            self.len(),
            self.manifest.dimension,
            path.display()
        );

        Ok(())
    }

    /// Read and verify the store at `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !Self::exists(path) {
            return Err(CasefileError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path).map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to read store file: {}", path.display()),
        })?;

        let corrupt = |reason: String| CasefileError::StoreCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let json =
            zstd::decode_all(&bytes[..]).map_err(|e| corrupt(format!("decompression failed: {e}")))?;
        let store: Store = serde_json::from_slice(&json)
            .map_err(|e| corrupt(format!("invalid store data: {e}")))?;

        if store.manifest.format_version != STORE_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                store.manifest.format_version
            )));
        }
        store
            .index
            .validate()
            .map_err(|e| corrupt(e.to_string()))?;
        if let Some(reason) = store.alignment_error() {
            return Err(corrupt(reason));
        }

        tracing::debug!("Loaded vector store with {} chunks", store.len());
        Ok(store)
    }

    fn alignment_error(&self) -> Option<String> {
        let vectors = self.index.len();
        let documents = self.documents.len();
        let metadatas = self.metadatas.len();

        if vectors != documents || documents != metadatas {
            return Some(format!(
                "collections are not aligned: {} vectors, {} documents, {} metadatas",
                vectors, documents, metadatas
            ));
        }
        if self.manifest.dimension != self.index.dimension() {
            return Some(format!(
                "manifest dimension {} does not match index dimension {}",
                self.manifest.dimension,
                self.index.dimension()
            ));
        }
        None
    }

    fn compute_fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.manifest.model.as_bytes());
        hasher.update(&(self.manifest.dimension as u64).to_le_bytes());
        for (position, (text, metadata)) in self.documents.iter().zip(&self.metadatas).enumerate() {
            hasher.update(&(text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
            hasher.update(&(metadata.source.len() as u64).to_le_bytes());
            hasher.update(metadata.source.as_bytes());
            if let Some(vector) = self.index.vector(position) {
                for value in vector {
                    hasher.update(&value.to_le_bytes());
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Flush the directory entry so the rename survives a crash
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| CasefileError::Io {
            source: e,
            context: format!("Failed to sync store directory: {}", parent.display()),
        })
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!("{}.tmp", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_store() -> Store {
        let index = VectorIndex::build(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5]]).unwrap();
        let chunks = vec![
            EvidenceChunk::new("The car was red.", "witness_sarah.txt"),
            EvidenceChunk::new("Suspect left at 21:05.", "police_log.txt"),
            EvidenceChunk::new("Red paint on the fence.", "forensics.txt"),
        ];
        Store::new("stub-model", index, chunks).unwrap()
    }

    fn write_raw(path: &Path, value: &serde_json::Value) {
        let json = serde_json::to_vec(value).unwrap();
        fs::write(path, zstd::encode_all(&json[..], 3).unwrap()).unwrap();
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store").join("vector_store.zst");

        let store = sample_store();
        store.save(&path).unwrap();

        let loaded = Store::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(1), Some(("Suspect left at 21:05.", "police_log.txt")));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_syncs_parent_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vector_store.zst");

        sample_store().save(&path).unwrap();
        sync_parent_dir(&path).unwrap();
        sync_parent_dir(Path::new("vector_store.zst")).unwrap();

        assert!(Store::exists(&path));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_overwrites_previous_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vector_store.zst");

        sample_store().save(&path).unwrap();
        Store::empty("stub-model", 2).save(&path).unwrap();

        let loaded = Store::load(&path).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.manifest().dimension, 2);
    }

    #[test]
    fn test_load_missing_store() {
        let temp = TempDir::new().unwrap();
        let result = Store::load(&temp.path().join("nothing.zst"));
        assert!(matches!(result, Err(CasefileError::StoreNotFound { .. })));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vector_store.zst");
        fs::write(&path, b"definitely not a store").unwrap();

        let result = Store::load(&path);
        assert!(matches!(result, Err(CasefileError::StoreCorrupt { .. })));
    }

    #[test]
    fn test_load_misaligned_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vector_store.zst");

        let mut value = serde_json::to_value(sample_store()).unwrap();
        value["documents"].as_array_mut().unwrap().pop();
        write_raw(&path, &value);

        match Store::load(&path) {
            Err(CasefileError::StoreCorrupt { reason, .. }) => {
                assert!(reason.contains("not aligned"), "unexpected reason: {reason}");
            }
            other => panic!("expected StoreCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_load_ragged_index_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vector_store.zst");

        let mut value = serde_json::to_value(sample_store()).unwrap();
        value["index"]["vectors"].as_array_mut().unwrap().pop();
        write_raw(&path, &value);

        assert!(matches!(
            Store::load(&path),
            Err(CasefileError::StoreCorrupt { .. })
        ));
    }

    #[test]
    fn test_new_rejects_misaligned_parts() {
        let index = VectorIndex::build(&[vec![1.0]]).unwrap();
        let result = Store::new("stub-model", index, Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = sample_store();
        let b = sample_store();
        assert_eq!(a.manifest().fingerprint, b.manifest().fingerprint);

        let index = VectorIndex::build(&[vec![0.0, 1.0]]).unwrap();
        let c = Store::new(
            "stub-model",
            index,
            vec![EvidenceChunk::new("The car was blue.", "witness_sarah.txt")],
        )
        .unwrap();
        assert_ne!(a.manifest().fingerprint, c.manifest().fingerprint);
    }
}
