//! Exact inner-product similarity index with caller-assigned ids
//!
//! Vectors are stored row-major in one contiguous buffer. The index supports
//! append-with-id and exhaustive top-k search; it has no removal. Compaction
//! rebuilds a fresh index instead (see [`crate::manager`]).

use crate::compressed::{decode_frame, encode_frame, Compression};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One search hit: raw inner product and entry id
pub type ScoredId = (f32, u64);

/// Exact inner-product index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<u64>,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidInput("index dimension must be > 0".to_string()));
        }
        Ok(Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        })
    }

    /// Build an index in one pass from parallel id/vector lists
    pub fn from_entries(dimension: usize, ids: &[u64], vectors: &[Vec<f32>]) -> Result<Self> {
        let mut index = Self::new(dimension)?;
        index.add_with_ids(vectors, ids)?;
        Ok(index)
    }

    /// Vector dimensionality
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in insertion order
    #[must_use]
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Append vectors under explicit ids.
    ///
    /// The batch is validated before anything is appended, so a rejected call
    /// leaves the index untouched. Re-using an id already present is a
    /// [`Error::ConsistencyViolation`].
    pub fn add_with_ids(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(Error::InvalidInput(format!(
                "{} vectors but {} ids",
                vectors.len(),
                ids.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let mut seen: HashSet<u64> = self.ids.iter().copied().collect();
        for &id in ids {
            if !seen.insert(id) {
                return Err(Error::ConsistencyViolation(format!(
                    "duplicate id {id} in similarity index"
                )));
            }
        }

        self.ids.extend_from_slice(ids);
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Top-`k` entries by descending inner product, ties by ascending id.
    ///
    /// Returns every entry when fewer than `k` exist; an empty index yields
    /// an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: Vec<ScoredId> = self
            .data
            .chunks_exact(self.dimension)
            .zip(&self.ids)
            .map(|(row, &id)| (dot_product(query, row), id))
            .collect();

        scores.sort_unstable_by(rank_order);
        scores.truncate(k);
        Ok(scores)
    }

    /// Encode to the durable artifact representation
    pub fn serialize(&self, compression: Compression) -> Result<Vec<u8>> {
        encode_frame(self, compression)
    }

    /// Decode an artifact produced by [`FlatIndex::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let index: Self = decode_frame(bytes)?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.data.len() != self.ids.len() * self.dimension {
            return Err(Error::SerializationError(format!(
                "index shape mismatch: {} ids, {} floats, dimension {}",
                self.ids.len(),
                self.data.len(),
                self.dimension
            )));
        }
        let unique: HashSet<u64> = self.ids.iter().copied().collect();
        if unique.len() != self.ids.len() {
            return Err(Error::ConsistencyViolation(
                "duplicate ids in persisted index".to_string(),
            ));
        }
        Ok(())
    }
}

/// Descending score, then ascending id
fn rank_order(a: &ScoredId, b: &ScoredId) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

/// Inner product of two equal-length vectors
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
