/// Exact nearest-neighbour index over squared Euclidean distance
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VectorIndexError {
    #[error("Cannot build an index from zero vectors")]
    EmptyInput,

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vectors must have at least one dimension")]
    ZeroDimension,

    #[error("Index data is inconsistent: {0}")]
    Corrupt(String),
}

/// One search hit: position in the index and its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the vector (and of its chunk in the store)
    pub position: usize,
    /// Squared L2 distance to the query, lower is nearer
    pub distance: f32,
}

/// Flat L2 index
///
/// Vectors are stored row-major in insertion order, so position `i` always
/// refers to the `i`th vector passed to [`VectorIndex::build`]. Search is an
/// exhaustive scan, which gives exact results for evidence-sized corpora.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Build an index over `vectors`, all of which must share one length
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, VectorIndexError> {
        let first = vectors.first().ok_or(VectorIndexError::EmptyInput)?;
        let dimension = first.len();
        if dimension == 0 {
            return Err(VectorIndexError::ZeroDimension);
        }

        let mut flat = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
        }

        Ok(Self {
            dimension,
            vectors: flat,
        })
    }

    /// An index with no entries; every search returns nothing
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Up to `k` nearest positions ordered by ascending distance
    ///
    /// Equal distances are ordered by position. An empty index answers with
    /// no results for any query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let matrix = ArrayView2::from_shape((self.len(), self.dimension), &self.vectors)
            .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;
        let query = ArrayView1::from(query);

        let mut neighbors: Vec<Neighbor> = matrix
            .rows()
            .into_iter()
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                Neighbor {
                    position,
                    distance: diff.dot(&diff),
                }
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Check that the flat buffer holds a whole number of vectors
    pub fn validate(&self) -> Result<(), VectorIndexError> {
        if self.dimension == 0 {
            if self.vectors.is_empty() {
                return Ok(());
            }
            return Err(VectorIndexError::ZeroDimension);
        }
        if self.vectors.len() % self.dimension != 0 {
            return Err(VectorIndexError::Corrupt(format!(
                "{} values is not a multiple of dimension {}",
                self.vectors.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}
