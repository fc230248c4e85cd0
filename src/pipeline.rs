//! Document indexing and query answering on top of an [`Embedder`]
//!
//! [`DocumentIndexer`] turns a document's chunk texts into vectors and
//! stores them; [`QueryEngine`] embeds a question and returns the relevant
//! chunks. Both share one [`IndexManager`], so the per-namespace locking and
//! crash safety of the manager apply unchanged.

use crate::embed::Embedder;
use crate::manager::{ChunkDescriptor, IndexManager};
use crate::retrieve::{RetrievalOutcome, Retriever};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One chunk of a document to index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInput {
    /// Chunk text to embed
    pub text: String,
    /// Identifier to store; generated when absent
    #[serde(default)]
    pub chunk_id: Option<String>,
    /// Ordering hint; the chunk's position when absent
    #[serde(default)]
    pub order: Option<i64>,
}

impl ChunkInput {
    /// Chunk with a generated id and positional order
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chunk_id: None,
            order: None,
        }
    }

    /// Set the chunk id
    #[must_use]
    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    /// Set the ordering hint
    #[must_use]
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// A stored chunk and the id it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChunk {
    /// Entry id
    pub id: u64,
    /// Stored chunk id
    pub chunk_id: String,
    /// Stored ordering hint
    pub order: i64,
}

/// Chunk id of the form `{doc_id}-{position}-{8 hex chars}`
#[must_use]
pub fn generate_chunk_id(doc_id: &str, position: usize) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{doc_id}-{position}-{}", &suffix[..8])
}

/// Embeds and stores documents
#[derive(Debug, Clone)]
pub struct DocumentIndexer<E: Embedder> {
    embedder: E,
    manager: Arc<IndexManager>,
}

impl<E: Embedder> DocumentIndexer<E> {
    /// Create an indexer writing through `manager`
    pub fn new(embedder: E, manager: Arc<IndexManager>) -> Self {
        Self { embedder, manager }
    }

    /// Get the embedder
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Embed `chunks` and store them under `doc_id`
    pub fn index_document(
        &self,
        namespace: &str,
        doc_id: &str,
        chunks: &[ChunkInput],
    ) -> Result<Vec<IndexedChunk>> {
        if doc_id.is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".to_string()));
        }
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                chunks.len()
            )));
        }

        let descriptors: Vec<ChunkDescriptor> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| ChunkDescriptor {
                chunk_id: chunk
                    .chunk_id
                    .clone()
                    .unwrap_or_else(|| generate_chunk_id(doc_id, i)),
                order: chunk.order.unwrap_or(i as i64),
            })
            .collect();

        let ids = self.manager.insert(namespace, doc_id, &descriptors, &vectors)?;
        tracing::debug!(
            namespace,
            doc_id,
            model = self.embedder.model_id(),
            chunks = ids.len(),
            "indexed document"
        );

        Ok(ids
            .into_iter()
            .zip(descriptors)
            .map(|(id, d)| IndexedChunk {
                id,
                chunk_id: d.chunk_id,
                order: d.order,
            })
            .collect())
    }

    /// Index plain texts in order with generated chunk ids
    pub fn index_texts(&self, namespace: &str, doc_id: &str, texts: &[&str]) -> Result<Vec<IndexedChunk>> {
        let chunks: Vec<ChunkInput> = texts.iter().map(|t| ChunkInput::new(*t)).collect();
        self.index_document(namespace, doc_id, &chunks)
    }

    /// Remove every chunk of a document
    pub fn delete_document(&self, namespace: &str, doc_id: &str) -> Result<usize> {
        self.manager.delete_by_document(namespace, doc_id)
    }

    /// Replace a document's chunks: delete, then index the new ones
    pub fn reindex_document(
        &self,
        namespace: &str,
        doc_id: &str,
        chunks: &[ChunkInput],
    ) -> Result<Vec<IndexedChunk>> {
        let removed = self.delete_document(namespace, doc_id)?;
        if removed > 0 {
            tracing::debug!(namespace, doc_id, removed, "replacing document");
        }
        self.index_document(namespace, doc_id, chunks)
    }
}

/// Answers text questions against a namespace
#[derive(Debug, Clone)]
pub struct QueryEngine<E: Embedder> {
    embedder: E,
    retriever: Retriever,
}

impl<E: Embedder> QueryEngine<E> {
    /// Create an engine
    pub fn new(embedder: E, retriever: Retriever) -> Self {
        Self {
            embedder,
            retriever,
        }
    }

    /// Get the retriever
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Relevant chunks for `question` with the retriever's defaults
    pub fn query(&self, namespace: &str, question: &str) -> Result<RetrievalOutcome> {
        let config = self.retriever.config();
        self.query_with(namespace, question, config.top_k, config.threshold)
    }

    /// Relevant chunks for `question` with explicit candidate count and threshold
    pub fn query_with(
        &self,
        namespace: &str,
        question: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<RetrievalOutcome> {
        let query = self.embedder.embed_query(question)?;
        self.retriever
            .retrieve_relevant(namespace, &query, top_k, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::MockEmbedder;
    use crate::manager::IndexConfig;
    use crate::retrieve::RetrievalConfig;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> (DocumentIndexer<MockEmbedder>, QueryEngine<MockEmbedder>) {
        let manager = Arc::new(IndexManager::new(IndexConfig::new(tmp.path()).with_sync(false)));
        let indexer = DocumentIndexer::new(MockEmbedder::new(32), Arc::clone(&manager));
        let retriever = Retriever::new(manager, RetrievalConfig::default()).unwrap();
        (indexer, QueryEngine::new(MockEmbedder::new(32), retriever))
    }

    #[test]
    fn test_generate_chunk_id_format() {
        let id = generate_chunk_id("doc7", 3);
        let parts: Vec<&str> = id.rsplitn(2, '-').collect();
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[1], "doc7-3");
        assert_ne!(generate_chunk_id("doc7", 3), id);
    }

    #[test]
    fn test_index_document_assigns_ids_and_orders() {
        let tmp = TempDir::new().unwrap();
        let (indexer, _) = setup(&tmp);

        let chunks = vec![
            ChunkInput::new("first chunk"),
            ChunkInput::new("second chunk").with_chunk_id("custom").with_order(10),
        ];
        let indexed = indexer.index_document("t", "D", &chunks).unwrap();
        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed[0].id, 1);
        assert_eq!(indexed[0].order, 0);
        assert!(indexed[0].chunk_id.starts_with("D-0-"));
        assert_eq!(indexed[1].chunk_id, "custom");
        assert_eq!(indexed[1].order, 10);
    }

    #[test]
    fn test_index_document_empty_inputs() {
        let tmp = TempDir::new().unwrap();
        let (indexer, _) = setup(&tmp);
        assert!(indexer.index_document("t", "D", &[]).unwrap().is_empty());
        assert!(matches!(
            indexer.index_texts("t", "", &["x"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            indexer.index_texts("t", "D", &[""]),
            Err(Error::Embedding(_))
        ));
    }

    #[test]
    fn test_query_finds_exact_text() {
        let tmp = TempDir::new().unwrap();
        let (indexer, engine) = setup(&tmp);
        indexer
            .index_texts("t", "D", &["the quick brown fox", "lorem ipsum dolor"])
            .unwrap();

        // Identical text embeds identically, so similarity is 1.
        let outcome = engine.query_with("t", "lorem ipsum dolor", 5, 0.99).unwrap();
        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.results[0].doc_id, "D");
        assert_eq!(outcome.results[0].order, 1);
    }

    #[test]
    fn test_reindex_replaces_document() {
        let tmp = TempDir::new().unwrap();
        let (indexer, engine) = setup(&tmp);
        indexer.index_texts("t", "A", &["alpha one", "alpha two"]).unwrap();
        indexer.index_texts("t", "B", &["beta"]).unwrap();

        let indexed = indexer
            .reindex_document("t", "A", &[ChunkInput::new("alpha three")])
            .unwrap();
        // B was compacted to id 1, so the new chunk follows it.
        assert_eq!(indexed[0].id, 2);

        let stats = engine.retriever().manager().stats("t").unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.documents, 2);
    }

    #[test]
    fn test_delete_document() {
        let tmp = TempDir::new().unwrap();
        let (indexer, engine) = setup(&tmp);
        indexer.index_texts("t", "A", &["gone soon"]).unwrap();
        assert_eq!(indexer.delete_document("t", "A").unwrap(), 1);
        assert!(engine.query_with("t", "gone soon", 5, 0.01).unwrap().is_empty());
    }
}
