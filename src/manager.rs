//! Index Manager: the single authority over each namespace's three stores
//!
//! Every namespace has its own reader-writer lock. `insert`,
//! `delete_by_document` and `clear_namespace` hold it exclusively for the
//! whole operation including the durable commit; `search` and the read-only
//! accessors share it. Mutations are computed on a copy of the current
//! [`Snapshot`] and swapped in only after [`persist::commit`] succeeds, so a
//! reader sees either the state before an operation or the state after it.
//!
//! Reads and deletes against a namespace that was never written answer from
//! an empty snapshot without caching anything. [`IndexManager::unload`]
//! releases a namespace's cached image and, when no call is using it, its
//! lock as well.

use crate::compressed::Compression;
use crate::flat::FlatIndex;
use crate::persist::{self, NamespaceDir, Snapshot};
use crate::store::{EntryMeta, MetadataStore, VectorStore};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Slot = Arc<RwLock<Option<Snapshot>>>;

/// Index manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding one subdirectory per namespace
    pub root: PathBuf,
    /// Codec for the binary artifacts
    pub compression: Compression,
    /// fsync staged files and the namespace directory on commit
    pub sync: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("indexes"),
            compression: Compression::Lz4,
            sync: true,
        }
    }
}

impl IndexConfig {
    /// Configuration rooted at `root` with default settings
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set the artifact codec
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enable or disable fsync on commit
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Caller-supplied description of one chunk to insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Opaque chunk identifier
    pub chunk_id: String,
    /// Ordering hint within the document
    #[serde(default)]
    pub order: i64,
}

impl ChunkDescriptor {
    /// Create a descriptor
    #[must_use]
    pub fn new(chunk_id: impl Into<String>, order: i64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            order,
        }
    }
}

/// One nearest-neighbor result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Entry id
    pub id: u64,
    /// Inner product between query and stored vector
    pub score: f32,
    /// Entry metadata
    pub meta: EntryMeta,
}

/// Summary of one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    /// Live entries
    pub entries: usize,
    /// Id the next insert will receive
    pub next_id: u64,
    /// Established dimensionality
    pub dimension: Option<usize>,
    /// Distinct documents
    pub documents: usize,
}

/// Owns all namespaces under one root directory
#[derive(Debug)]
pub struct IndexManager {
    config: IndexConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl IndexManager {
    /// Create a manager; namespaces are loaded lazily on first use
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Manager over `root` with default settings
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(IndexConfig::new(root))
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Store `vectors` for `entries` of document `doc_id`, returning the
    /// assigned ids in input order.
    ///
    /// The first insert into a namespace fixes its dimensionality. Nothing is
    /// committed unless all three stores were written.
    ///
    /// [`Error::CommitUnapplied`] means the insert is durable even though the
    /// call failed: the entries appear once the next access finishes the swap.
    /// Do not retry it, or the entries are stored twice.
    pub fn insert(
        &self,
        namespace: &str,
        doc_id: &str,
        entries: &[ChunkDescriptor],
        vectors: &[Vec<f32>],
    ) -> Result<Vec<u64>> {
        if entries.len() != vectors.len() {
            return Err(Error::InvalidInput(format!(
                "{} entries but {} vectors",
                entries.len(),
                vectors.len()
            )));
        }

        let (dir, slot) = self.slot(namespace)?;
        let mut guard = slot.write();
        let current = Self::ensure_loaded(&dir, &mut guard)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = current.dimension().unwrap_or(vectors[0].len());
        if dimension == 0 {
            return Err(Error::InvalidInput("vectors must not be empty".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let mut next = current.clone();
        let ids = next.metadata.allocate(entries.len())?;
        if next.index.is_none() {
            next.index = Some(FlatIndex::new(dimension)?);
            next.vectors = Some(VectorStore::new(dimension));
        }
        let (Some(index), Some(store)) = (next.index.as_mut(), next.vectors.as_mut()) else {
            return Err(Error::ConsistencyViolation(
                "index and vector store must exist together".to_string(),
            ));
        };
        for ((&id, entry), vector) in ids.iter().zip(entries).zip(vectors) {
            next.metadata.insert(
                id,
                EntryMeta {
                    chunk_id: entry.chunk_id.clone(),
                    doc_id: doc_id.to_string(),
                    order: entry.order,
                },
            )?;
            store.insert(id, vector.clone())?;
        }
        index.add_with_ids(vectors, &ids)?;

        self.commit(&dir, &mut guard, next)?;
        tracing::info!(
            namespace,
            doc_id,
            inserted = ids.len(),
            first_id = ids[0],
            last_id = ids[ids.len() - 1],
            "inserted entries"
        );
        Ok(ids)
    }

    /// Exact top-`top_k` inner-product search.
    ///
    /// A namespace that has never been written returns an empty list.
    pub fn search(&self, namespace: &str, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::InvalidInput("top_k must be at least 1".to_string()));
        }

        self.with_snapshot(namespace, |snapshot| {
            let Some(index) = &snapshot.index else {
                return Ok(Vec::new());
            };
            let hits = index.search(query, top_k)?;
            tracing::debug!(namespace, top_k, hits = hits.len(), "searched namespace");

            hits.into_iter()
                .map(|(score, id)| {
                    let meta = snapshot.metadata.get(id).cloned().ok_or_else(|| {
                        Error::ConsistencyViolation(format!("index id {id} has no metadata"))
                    })?;
                    Ok(SearchHit { id, score, meta })
                })
                .collect()
        })
    }

    /// Remove every entry of `doc_id` and compact the namespace so the
    /// survivors are renumbered `1..=N`. Returns the number removed.
    ///
    /// Deleting an unknown document touches nothing and returns 0. As with
    /// [`IndexManager::insert`], [`Error::CommitUnapplied`] means the
    /// deletion stands.
    pub fn delete_by_document(&self, namespace: &str, doc_id: &str) -> Result<usize> {
        let (dir, Some(slot)) = self.existing_slot(namespace)? else {
            tracing::warn!(namespace, doc_id, "namespace does not exist, nothing deleted");
            return Ok(0);
        };
        let mut guard = slot.write();
        let current = Self::ensure_loaded(&dir, &mut guard)?;

        let Some((next, removed)) = compact(current, doc_id)? else {
            tracing::warn!(namespace, doc_id, "no entries for document, nothing deleted");
            return Ok(0);
        };
        let remaining = next.len();

        self.commit(&dir, &mut guard, next)?;
        tracing::info!(namespace, doc_id, removed, remaining, "compacted namespace");
        Ok(removed)
    }

    /// Drop all entries of a namespace and reset its counter to 1.
    ///
    /// Works without reading the existing artifacts, so it also resets a
    /// namespace whose files are damaged. Returns `false` if the namespace
    /// was never written.
    pub fn clear_namespace(&self, namespace: &str) -> Result<bool> {
        let (dir, Some(slot)) = self.existing_slot(namespace)? else {
            return Ok(false);
        };
        let mut guard = slot.write();
        if !dir.exists() {
            *guard = Some(Snapshot::empty());
            return Ok(false);
        }

        persist::recover(&dir)?;
        self.commit(&dir, &mut guard, Snapshot::empty())?;
        tracing::info!(namespace, "cleared namespace");
        Ok(true)
    }

    /// Entry count, counter and dimensionality of a namespace
    pub fn stats(&self, namespace: &str) -> Result<NamespaceStats> {
        self.with_snapshot(namespace, |snapshot| {
            Ok(NamespaceStats {
                entries: snapshot.len(),
                next_id: snapshot.metadata.next_id,
                dimension: snapshot.dimension(),
                documents: snapshot.metadata.document_ids().len(),
            })
        })
    }

    /// Live entries of one document, sorted by `order` then id
    pub fn document_entries(&self, namespace: &str, doc_id: &str) -> Result<Vec<(u64, EntryMeta)>> {
        self.with_snapshot(namespace, |snapshot| {
            Ok(snapshot
                .metadata
                .document_entries(doc_id)
                .into_iter()
                .map(|(id, meta)| (id, meta.clone()))
                .collect())
        })
    }

    /// Metadata store of a namespace as currently committed
    pub fn metadata(&self, namespace: &str) -> Result<MetadataStore> {
        self.with_snapshot(namespace, |snapshot| Ok(snapshot.metadata.clone()))
    }

    /// Full in-memory image of a namespace as currently committed
    pub fn snapshot(&self, namespace: &str) -> Result<Snapshot> {
        self.with_snapshot(namespace, |snapshot| Ok(snapshot.clone()))
    }

    /// Drop the cached image of a namespace; the next access reloads from disk
    pub fn unload(&self, namespace: &str) -> Result<()> {
        persist::validate_namespace(namespace)?;
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get(namespace).map(Arc::clone) else {
            return Ok(());
        };
        // Only the map and `slot` hold it, and new holders need the map lock.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(namespace);
            return Ok(());
        }
        drop(slots);
        *slot.write() = None;
        Ok(())
    }

    /// Namespaces whose snapshot is cached in memory, by name
    #[must_use]
    pub fn loaded_namespaces(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        let mut names: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.read().is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    /// Slot of a namespace that is cached or present on disk
    fn existing_slot(&self, namespace: &str) -> Result<(NamespaceDir, Option<Slot>)> {
        let dir = NamespaceDir::new(&self.config.root, namespace)?;
        let mut slots = self.slots.lock();
        let slot = (slots.contains_key(namespace) || dir.exists())
            .then(|| Arc::clone(slots.entry(namespace.to_string()).or_default()));
        Ok((dir, slot))
    }

    fn slot(&self, namespace: &str) -> Result<(NamespaceDir, Slot)> {
        let dir = NamespaceDir::new(&self.config.root, namespace)?;
        let slot = self
            .slots
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .clone();
        Ok((dir, slot))
    }

    fn ensure_loaded<'a>(dir: &NamespaceDir, state: &'a mut Option<Snapshot>) -> Result<&'a Snapshot> {
        if state.is_none() {
            persist::recover(dir)?;
            let snapshot = persist::load(dir).inspect_err(|e| {
                if e.is_integrity_failure() {
                    tracing::error!(namespace_dir = %dir.path().display(), error = %e, "namespace failed validation");
                }
            })?;
            *state = Some(snapshot);
        }
        Ok(state.get_or_insert_with(Snapshot::empty))
    }

    fn with_snapshot<T>(&self, namespace: &str, f: impl FnOnce(&Snapshot) -> Result<T>) -> Result<T> {
        let (dir, Some(slot)) = self.existing_slot(namespace)? else {
            return f(&Snapshot::empty());
        };
        loop {
            {
                let guard = slot.read();
                if let Some(snapshot) = guard.as_ref() {
                    return f(snapshot);
                }
            }
            let mut guard = slot.write();
            Self::ensure_loaded(&dir, &mut guard)?;
        }
    }

    fn commit(&self, dir: &NamespaceDir, state: &mut Option<Snapshot>, next: Snapshot) -> Result<()> {
        match persist::commit(dir, &next, self.config.compression, self.config.sync) {
            Ok(()) => {
                *state = Some(next);
                Ok(())
            }
            Err(e) => {
                // Disk may hold a decided-but-unapplied commit; reload next time.
                *state = None;
                tracing::error!(
                    namespace_dir = %dir.path().display(),
                    error = %e,
                    committed = e.is_committed(),
                    "commit failed"
                );
                Err(e)
            }
        }
    }
}

/// Rebuild `current` without the entries of `doc_id`.
///
/// Returns `None` when no entry matches. Survivors keep their relative id
/// order and are renumbered from 1. A survivor without a stored vector
/// aborts the rebuild with [`Error::ConsistencyViolation`].
pub fn compact(current: &Snapshot, doc_id: &str) -> Result<Option<(Snapshot, usize)>> {
    let (kept, removed) = current.metadata.partition_by_doc(doc_id);
    if removed.is_empty() {
        return Ok(None);
    }
    if kept.is_empty() {
        return Ok(Some((Snapshot::empty(), removed.len())));
    }

    let old_vectors = current.vectors.as_ref().ok_or_else(|| {
        Error::ConsistencyViolation("live entries but no vector store".to_string())
    })?;
    let dimension = old_vectors.dimension();

    let mut metadata = MetadataStore::new();
    let new_ids = metadata.allocate(kept.len())?;
    let mut vectors = VectorStore::new(dimension);
    let mut rows = Vec::with_capacity(kept.len());
    for (&new_id, (old_id, meta)) in new_ids.iter().zip(&kept) {
        let vector = old_vectors.get(*old_id).ok_or_else(|| {
            tracing::error!(old_id, doc_id, "kept entry has no stored vector");
            Error::ConsistencyViolation(format!("kept id {old_id} has no stored vector"))
        })?;
        metadata.insert(new_id, (*meta).clone())?;
        vectors.insert(new_id, vector.to_vec())?;
        rows.push(vector.to_vec());
    }
    let index = FlatIndex::from_entries(dimension, &new_ids, &rows)?;

    Ok(Some((
        Snapshot {
            metadata,
            index: Some(index),
            vectors: Some(vectors),
        },
        removed.len(),
    )))
}
