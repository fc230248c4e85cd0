//! Error types for tenant-index

use std::path::PathBuf;
use thiserror::Error;

/// Result type for tenant-index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for namespace index operations
#[derive(Error, Debug)]
pub enum Error {
    /// Vector dimensionality disagrees with the namespace
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Established dimension
        expected: usize,
        /// Offending dimension
        actual: usize,
    },

    /// The three stores of a namespace disagree
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A durable artifact could not be written or swapped into place
    #[error("durable write failed for {}: {source}", path.display())]
    DurableWrite {
        /// Artifact being written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The commit is decided but its artifacts could not all be swapped in.
    ///
    /// The change is durable and the next load of the namespace finishes it.
    /// Retrying the operation would apply it twice.
    #[error("commit decided but not applied at {}: {source}", path.display())]
    CommitUnapplied {
        /// Artifact whose swap failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Tenant id cannot be used as a namespace
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// Malformed request arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Persisted artifact failed integrity checks
    #[error("corrupted artifact {}: {reason}", path.display())]
    Corrupted {
        /// Artifact path
        path: PathBuf,
        /// What failed
        reason: String,
    },

    /// Serialization error (serde_json)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Serialization error (bincode/compression)
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding collaborator failed
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl Error {
    /// Whether the error means on-disk or in-memory state can no longer be trusted
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::ConsistencyViolation(_) | Self::Corrupted { .. })
    }

    /// Whether the failed operation took effect anyway
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::CommitUnapplied { .. })
    }
}
