//! On-disk layout and crash-safe commits for namespace snapshots
//!
//! Each namespace lives in `<root>/<namespace>/`:
//!
//! - `index.bin`: serialized [`FlatIndex`]
//! - `meta.json`: [`MetadataStore`] as JSON
//! - `vectors.bin`: serialized [`VectorStore`]
//!
//! A commit stages every new artifact as `<name>.tmp`, then writes a
//! `COMMIT` marker listing the pending renames and removals, performs them,
//! and deletes the marker. If the process dies mid-swap the next
//! [`recover`] finishes the marked commit; temp files without a marker are
//! leftovers of an aborted staging phase and are discarded.

use crate::compressed::Compression;
use crate::flat::FlatIndex;
use crate::store::{MetadataStore, VectorStore};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Serialized similarity index
pub const INDEX_FILE: &str = "index.bin";
/// Metadata document
pub const META_FILE: &str = "meta.json";
/// Raw vector store
pub const VECTORS_FILE: &str = "vectors.bin";
/// Pending-swap marker
pub const COMMIT_FILE: &str = "COMMIT";

const TMP_EXT: &str = "tmp";

/// Reject tenant ids that cannot safely name a directory
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let bad = namespace.is_empty()
        || namespace == "."
        || namespace == ".."
        || namespace.len() > 255
        || namespace
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if bad {
        return Err(Error::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// In-memory image of one namespace's three stores
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Id counter and entry metadata
    pub metadata: MetadataStore,
    /// Similarity index, absent until the first insert
    pub index: Option<FlatIndex>,
    /// Raw vectors, present exactly when `index` is
    pub vectors: Option<VectorStore>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// A namespace with no entries and the counter at 1
    #[must_use]
    pub fn empty() -> Self {
        Self {
            metadata: MetadataStore::new(),
            index: None,
            vectors: None,
        }
    }

    /// Established dimensionality, if any entry was ever stored
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(FlatIndex::dimension)
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Check if the namespace holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Verify the three stores describe the same id set and dimensionality
    pub fn check_consistency(&self) -> Result<()> {
        let meta_ids = self.metadata.ids();
        match (&self.index, &self.vectors) {
            (None, None) if meta_ids.is_empty() => Ok(()),
            (None, None) => Err(Error::ConsistencyViolation(format!(
                "{} metadata entries but no index or vector store",
                meta_ids.len()
            ))),
            (Some(index), Some(vectors)) => {
                if index.dimension() != vectors.dimension() {
                    return Err(Error::ConsistencyViolation(format!(
                        "index dimension {} != vector store dimension {}",
                        index.dimension(),
                        vectors.dimension()
                    )));
                }
                let index_ids: BTreeSet<u64> = index.ids().iter().copied().collect();
                let vector_ids = vectors.ids();
                if index_ids != meta_ids || vector_ids != meta_ids {
                    return Err(Error::ConsistencyViolation(format!(
                        "id sets disagree: index {}, metadata {}, vectors {}",
                        index_ids.len(),
                        meta_ids.len(),
                        vector_ids.len()
                    )));
                }
                Ok(())
            }
            _ => Err(Error::ConsistencyViolation(
                "index and vector store must exist together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CommitMarker {
    write: Vec<String>,
    remove: Vec<String>,
}

/// Paths of one namespace directory
#[derive(Debug, Clone)]
pub struct NamespaceDir {
    path: PathBuf,
}

impl NamespaceDir {
    /// Resolve `<root>/<namespace>` after validating the namespace
    pub fn new(root: &Path, namespace: &str) -> Result<Self> {
        validate_namespace(namespace)?;
        Ok(Self {
            path: root.join(namespace),
        })
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything has ever been written for this namespace
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Path of a named artifact
    #[must_use]
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    fn staged(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.{TMP_EXT}"))
    }
}

/// Finish or discard an interrupted commit. Returns `true` if anything was done.
///
/// Must run under the namespace's exclusive lock.
pub fn recover(dir: &NamespaceDir) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }

    let marker_path = dir.artifact(COMMIT_FILE);
    let mut acted = false;
    if marker_path.exists() {
        let marker: CommitMarker = serde_json::from_slice(&fs::read(&marker_path)?)?;
        tracing::warn!(
            namespace_dir = %dir.path().display(),
            pending = marker.write.len(),
            "completing interrupted commit"
        );
        apply_marker(dir, &marker)?;
        acted = true;
    }

    for entry in fs::read_dir(dir.path())? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(TMP_EXT) {
            tracing::warn!(path = %path.display(), "removing stale staged artifact");
            fs::remove_file(&path)?;
            acted = true;
        }
    }
    Ok(acted)
}

/// Read a namespace's snapshot and verify its stores agree.
///
/// An absent directory or metadata file is an empty namespace.
pub fn load(dir: &NamespaceDir) -> Result<Snapshot> {
    let meta_path = dir.artifact(META_FILE);
    let metadata = match read_optional(&meta_path)? {
        Some(bytes) => MetadataStore::from_json(&bytes).map_err(|e| corrupted(&meta_path, &e))?,
        None => MetadataStore::new(),
    };

    let index_path = dir.artifact(INDEX_FILE);
    let index = read_optional(&index_path)?
        .map(|bytes| FlatIndex::deserialize(&bytes).map_err(|e| corrupted(&index_path, &e)))
        .transpose()?;

    let vectors_path = dir.artifact(VECTORS_FILE);
    let vectors = read_optional(&vectors_path)?
        .map(|bytes| VectorStore::deserialize(&bytes).map_err(|e| corrupted(&vectors_path, &e)))
        .transpose()?;

    let snapshot = Snapshot {
        metadata,
        index,
        vectors,
    };
    snapshot.check_consistency()?;

    tracing::debug!(
        namespace_dir = %dir.path().display(),
        entries = snapshot.len(),
        next_id = snapshot.metadata.next_id,
        "loaded namespace"
    );
    Ok(snapshot)
}

/// Durably replace the namespace's artifacts with `snapshot`.
///
/// Nothing visible changes unless every artifact was staged successfully.
/// Once the marker is in place a failed swap returns
/// [`Error::CommitUnapplied`]: the change stands and [`recover`] finishes it.
/// When `snapshot` has no index the index and vector files are removed and
/// only the metadata document remains.
pub fn commit(
    dir: &NamespaceDir,
    snapshot: &Snapshot,
    compression: Compression,
    sync: bool,
) -> Result<()> {
    snapshot.check_consistency()?;
    fs::create_dir_all(dir.path()).map_err(|e| durable(dir.path(), e))?;

    let mut staged: Vec<(&str, Vec<u8>)> = vec![(META_FILE, snapshot.metadata.to_json()?)];
    let mut remove = Vec::new();
    match (&snapshot.index, &snapshot.vectors) {
        (Some(index), Some(vectors)) => {
            staged.push((INDEX_FILE, index.serialize(compression)?));
            staged.push((VECTORS_FILE, vectors.serialize(compression)?));
        }
        _ => {
            remove.push(INDEX_FILE.to_string());
            remove.push(VECTORS_FILE.to_string());
        }
    }

    for (i, (name, bytes)) in staged.iter().enumerate() {
        let tmp = dir.staged(name);
        if let Err(e) = write_file(&tmp, bytes, sync) {
            for (written, _) in &staged[..=i] {
                let _ = fs::remove_file(dir.staged(written));
            }
            return Err(durable(&tmp, e));
        }
    }

    let marker = CommitMarker {
        write: staged.iter().map(|(name, _)| (*name).to_string()).collect(),
        remove,
    };
    let marker_tmp = dir.staged(COMMIT_FILE);
    let marker_path = dir.artifact(COMMIT_FILE);
    let marker_bytes = serde_json::to_vec(&marker)?;
    if let Err(e) = write_file(&marker_tmp, &marker_bytes, sync)
        .and_then(|()| fs::rename(&marker_tmp, &marker_path))
    {
        let _ = fs::remove_file(&marker_tmp);
        for name in &marker.write {
            let _ = fs::remove_file(dir.staged(name));
        }
        return Err(durable(&marker_path, e));
    }

    // From here on the commit is decided: a failure is finished by `recover`.
    apply_marker(dir, &marker).map_err(decided)?;
    if sync {
        sync_dir(dir.path()).map_err(|e| decided(durable(dir.path(), e)))?;
    }
    Ok(())
}

fn decided(err: Error) -> Error {
    match err {
        Error::DurableWrite { path, source } => Error::CommitUnapplied { path, source },
        other => other,
    }
}

fn apply_marker(dir: &NamespaceDir, marker: &CommitMarker) -> Result<()> {
    for name in &marker.write {
        let tmp = dir.staged(name);
        let dest = dir.artifact(name);
        // Already renamed by an earlier, interrupted attempt.
        if !tmp.exists() && dest.exists() {
            continue;
        }
        fs::rename(&tmp, &dest).map_err(|e| durable(&dest, e))?;
    }
    for name in &marker.remove {
        let path = dir.artifact(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(durable(&path, e)),
        }
    }
    let marker_path = dir.artifact(COMMIT_FILE);
    fs::remove_file(&marker_path).map_err(|e| durable(&marker_path, e))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn durable(path: &Path, source: io::Error) -> Error {
    Error::DurableWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupted(path: &Path, err: &Error) -> Error {
    Error::Corrupted {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
