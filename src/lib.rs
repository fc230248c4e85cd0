//! Tenant-Index: per-tenant exact vector index for retrieval-augmented generation
//!
//! Each tenant owns an isolated namespace of three stores kept in lockstep:
//! an exact inner-product similarity index, a metadata document mapping ids
//! to `{chunkId, docId, order}`, and the raw vectors the index is rebuilt
//! from. Deleting a document compacts the namespace so surviving ids are
//! `1..=N` again. Every mutation commits all three stores or none of them.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tenant_index::{
//!     ChunkDescriptor, IndexConfig, IndexManager, RetrievalConfig, Retriever,
//! };
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = Arc::new(IndexManager::new(IndexConfig::new(dir.path())));
//!
//! // Vectors arrive pre-computed from an external embedder
//! let ids = manager
//!     .insert(
//!         "tenant-1",
//!         "handbook",
//!         &[ChunkDescriptor::new("handbook-0", 0), ChunkDescriptor::new("handbook-1", 1)],
//!         &[vec![1.0, 0.0], vec![0.0, 1.0]],
//!     )
//!     .unwrap();
//! assert_eq!(ids, vec![1, 2]);
//!
//! let retriever = Retriever::new(Arc::clone(&manager), RetrievalConfig::default()).unwrap();
//! let outcome = retriever.retrieve("tenant-1", &[1.0, 0.0]).unwrap();
//! assert_eq!(outcome.results[0].chunk_id, "handbook-0");
//!
//! assert_eq!(manager.delete_by_document("tenant-1", "handbook").unwrap(), 2);
//! ```
//!
//! # Relevance
//!
//! Raw inner products are mapped to a similarity by a [`ScoreTransform`]
//! before the threshold is applied:
//!
//! - [`ScoreTransform::UnitInterval`] - `clamp((1 + raw) / 2, 0, 1)` (default)
//! - [`ScoreTransform::Raw`] - the inner product unchanged
//!
//! # Example: Text In, Chunks Out
//!
//! ```rust
//! use std::sync::Arc;
//! use tenant_index::{
//!     embed::MockEmbedder,
//!     pipeline::{DocumentIndexer, QueryEngine},
//!     IndexConfig, IndexManager, RetrievalConfig, Retriever,
//! };
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = Arc::new(IndexManager::new(IndexConfig::new(dir.path()).with_sync(false)));
//! let indexer = DocumentIndexer::new(MockEmbedder::new(64), Arc::clone(&manager));
//! indexer.index_texts("acme", "faq", &["How do I reset my password?"]).unwrap();
//!
//! let engine = QueryEngine::new(
//!     MockEmbedder::new(64),
//!     Retriever::new(manager, RetrievalConfig::default()).unwrap(),
//! );
//! let outcome = engine.query("acme", "How do I reset my password?").unwrap();
//! assert_eq!(outcome.len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]

pub mod compressed;
pub mod embed;
pub mod error;
pub mod flat;
pub mod manager;
pub mod persist;
pub mod pipeline;
pub mod retrieve;
pub mod store;

pub use compressed::Compression;
pub use embed::Embedder;
pub use error::{Error, Result};
pub use flat::FlatIndex;
pub use manager::{ChunkDescriptor, IndexConfig, IndexManager, NamespaceStats, SearchHit};
pub use persist::Snapshot;
pub use pipeline::{ChunkInput, DocumentIndexer, IndexedChunk, QueryEngine};
pub use retrieve::{RelevantChunk, RetrievalConfig, RetrievalOutcome, Retriever, ScoreTransform};
pub use store::{EntryMeta, MetadataStore, VectorStore};
