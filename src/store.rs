//! Metadata and raw-vector stores for one namespace

use crate::compressed::{decode_frame, encode_frame, Compression};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifying metadata of one entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    /// Caller-supplied chunk identifier
    pub chunk_id: String,
    /// Owning document
    pub doc_id: String,
    /// Ordering hint within the document (not unique)
    #[serde(default)]
    pub order: i64,
}

/// Durable id -> metadata mapping plus the id counter.
///
/// Serialized as JSON: `{"nextId": 4, "items": {"1": {...}, ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStore {
    /// Next id to hand out
    #[serde(alias = "next_id")]
    pub next_id: u64,
    /// Live entries keyed by id
    #[serde(default)]
    pub items: BTreeMap<u64, EntryMeta>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// Empty store with the counter at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            items: BTreeMap::new(),
        }
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up one entry
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&EntryMeta> {
        self.items.get(&id)
    }

    /// Live ids in ascending order
    #[must_use]
    pub fn ids(&self) -> BTreeSet<u64> {
        self.items.keys().copied().collect()
    }

    /// Reserve the next `count` ids.
    ///
    /// Fails without reserving anything if the counter would overflow.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u64>> {
        let start = self.next_id;
        let end = u64::try_from(count)
            .ok()
            .and_then(|n| start.checked_add(n))
            .ok_or_else(|| {
                Error::ConsistencyViolation(format!(
                    "allocating {count} ids past next id {start} overflows"
                ))
            })?;
        self.next_id = end;
        Ok((start..end).collect())
    }

    /// Record an entry under an allocated id
    pub fn insert(&mut self, id: u64, meta: EntryMeta) -> Result<()> {
        if id >= self.next_id {
            return Err(Error::ConsistencyViolation(format!(
                "id {id} was never allocated (next id {})",
                self.next_id
            )));
        }
        if self.items.contains_key(&id) {
            return Err(Error::ConsistencyViolation(format!(
                "id {id} already present in metadata"
            )));
        }
        self.items.insert(id, meta);
        Ok(())
    }

    /// Split entries into (kept, removed) by document, both by ascending id
    #[must_use]
    pub fn partition_by_doc(&self, doc_id: &str) -> (Vec<(u64, &EntryMeta)>, Vec<u64>) {
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for (&id, meta) in &self.items {
            if meta.doc_id == doc_id {
                removed.push(id);
            } else {
                kept.push((id, meta));
            }
        }
        (kept, removed)
    }

    /// Distinct document ids
    #[must_use]
    pub fn document_ids(&self) -> BTreeSet<&str> {
        self.items.values().map(|m| m.doc_id.as_str()).collect()
    }

    /// Entries of one document sorted by `order`, then id
    #[must_use]
    pub fn document_entries(&self, doc_id: &str) -> Vec<(u64, &EntryMeta)> {
        let mut entries: Vec<(u64, &EntryMeta)> = self
            .items
            .iter()
            .filter(|(_, m)| m.doc_id == doc_id)
            .map(|(&id, m)| (id, m))
            .collect();
        entries.sort_by_key(|(id, m)| (m.order, *id));
        entries
    }

    /// Encode as JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON, checking the counter is ahead of every id
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let store: Self = serde_json::from_slice(bytes)?;
        if let Some((&max, _)) = store.items.last_key_value() {
            if max >= store.next_id {
                return Err(Error::ConsistencyViolation(format!(
                    "metadata id {max} is not below next id {}",
                    store.next_id
                )));
            }
        }
        Ok(store)
    }
}

/// Durable id -> raw vector mapping, the source of truth for rebuilds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    dimension: usize,
    vectors: BTreeMap<u64, Vec<f32>>,
}

impl VectorStore {
    /// Empty store for vectors of `dimension` components
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    /// Vector dimensionality
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Stored ids in ascending order
    #[must_use]
    pub fn ids(&self) -> BTreeSet<u64> {
        self.vectors.keys().copied().collect()
    }

    /// Fetch one vector
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.vectors.get(&id).map(Vec::as_slice)
    }

    /// Store a vector under a fresh id
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.vectors.contains_key(&id) {
            return Err(Error::ConsistencyViolation(format!(
                "id {id} already present in vector store"
            )));
        }
        self.vectors.insert(id, vector);
        Ok(())
    }

    /// Encode to the durable artifact representation
    pub fn serialize(&self, compression: Compression) -> Result<Vec<u8>> {
        encode_frame(self, compression)
    }

    /// Decode an artifact produced by [`VectorStore::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let store: Self = decode_frame(bytes)?;
        if let Some((id, v)) = store.vectors.iter().find(|(_, v)| v.len() != store.dimension) {
            return Err(Error::SerializationError(format!(
                "vector {id} has {} components, store dimension is {}",
                v.len(),
                store.dimension
            )));
        }
        Ok(store)
    }
}
