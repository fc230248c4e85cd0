//! Threshold-filtered retrieval over the Index Manager

use crate::manager::{IndexManager, SearchHit};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maps a raw inner product onto the scale the relevance threshold uses.
///
/// Both variants are monotonically non-decreasing, so filtering on the
/// transformed similarity keeps exactly the hits whose raw score is at or
/// above [`ScoreTransform::raw_threshold`]. For `UnitInterval` this holds
/// only for thresholds in (0, 1]; the clamp flattens everything outside.
/// Thresholds that break the equivalence are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTransform {
    /// `clamp((1 + raw) / 2, 0, 1)`; cosine in [-1, 1] becomes [0, 1]
    #[default]
    UnitInterval,
    /// Raw inner product, unchanged
    Raw,
}

impl ScoreTransform {
    /// Transformed similarity of a raw score
    #[must_use]
    pub fn similarity(self, raw: f32) -> f32 {
        match self {
            Self::UnitInterval => ((1.0 + raw) / 2.0).clamp(0.0, 1.0),
            Self::Raw => raw,
        }
    }

    /// Raw-score cutoff equivalent to a similarity `threshold`
    #[must_use]
    pub fn raw_threshold(self, threshold: f32) -> f32 {
        match self {
            Self::UnitInterval => 2.0 * threshold - 1.0,
            Self::Raw => threshold,
        }
    }

    fn threshold_problem(self, threshold: f32) -> Option<String> {
        if !threshold.is_finite() {
            return Some(format!("threshold must be finite, got {threshold}"));
        }
        if self == Self::UnitInterval && (threshold <= 0.0 || threshold > 1.0) {
            return Some(format!(
                "threshold must be in (0, 1] for the unit-interval transform, got {threshold}"
            ));
        }
        None
    }
}

/// Retrieval defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index
    pub top_k: usize,
    /// Minimum transformed similarity for a hit to count as relevant
    pub threshold: f32,
    /// Raw score transform
    pub transform: ScoreTransform,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.60,
            transform: ScoreTransform::UnitInterval,
        }
    }
}

impl RetrievalConfig {
    /// Set the candidate count
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the relevance threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the score transform
    #[must_use]
    pub fn with_transform(mut self, transform: ScoreTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".to_string()));
        }
        if let Some(reason) = self.transform.threshold_problem(self.threshold) {
            return Err(Error::InvalidConfig(reason));
        }
        Ok(())
    }
}

/// A hit that cleared the relevance threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantChunk {
    /// Entry id at retrieval time
    pub id: u64,
    /// Chunk identifier for fetching the text
    pub chunk_id: String,
    /// Owning document
    pub doc_id: String,
    /// Ordering hint within the document
    pub order: i64,
    /// Raw inner product
    pub score: f32,
    /// Transformed similarity compared against the threshold
    pub similarity: f32,
}

/// Relevant hits plus the mean similarity over them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Relevant hits by descending similarity
    pub results: Vec<RelevantChunk>,
    /// Mean similarity of `results`, 0 when empty
    pub confidence: f32,
}

impl RetrievalOutcome {
    /// Confidence rounded to two decimals for display
    #[must_use]
    pub fn confidence_rounded(&self) -> f32 {
        (self.confidence * 100.0).round() / 100.0
    }

    /// Number of relevant hits
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if nothing cleared the threshold
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Keep the hits whose transformed similarity is at least `threshold`
#[must_use]
pub fn filter_relevant(hits: Vec<SearchHit>, threshold: f32, transform: ScoreTransform) -> RetrievalOutcome {
    let mut results: Vec<RelevantChunk> = hits
        .into_iter()
        .filter_map(|hit| {
            let similarity = transform.similarity(hit.score);
            (similarity >= threshold).then(|| RelevantChunk {
                id: hit.id,
                chunk_id: hit.meta.chunk_id,
                doc_id: hit.meta.doc_id,
                order: hit.meta.order,
                score: hit.score,
                similarity,
            })
        })
        .collect();
    // Stable, so equal similarities keep the index's ascending-id order.
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let confidence = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.similarity).sum::<f32>() / results.len() as f32
    };
    RetrievalOutcome {
        results,
        confidence,
    }
}

/// Relevance-filtered search over a shared [`IndexManager`]
#[derive(Debug, Clone)]
pub struct Retriever {
    manager: Arc<IndexManager>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever with the given defaults
    pub fn new(manager: Arc<IndexManager>, config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { manager, config })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Get the underlying manager
    #[must_use]
    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// Search with explicit candidate count and threshold.
    ///
    /// The threshold must suit the configured transform: any finite value
    /// for `Raw`, (0, 1] for `UnitInterval`.
    pub fn retrieve_relevant(
        &self,
        namespace: &str,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<RetrievalOutcome> {
        if let Some(reason) = self.config.transform.threshold_problem(threshold) {
            return Err(Error::InvalidInput(reason));
        }
        let hits = self.manager.search(namespace, query, top_k)?;
        let candidates = hits.len();
        let outcome = filter_relevant(hits, threshold, self.config.transform);
        tracing::debug!(
            namespace,
            candidates,
            relevant = outcome.len(),
            confidence = outcome.confidence,
            "retrieved relevant chunks"
        );
        Ok(outcome)
    }

    /// Search with the configured candidate count and threshold
    pub fn retrieve(&self, namespace: &str, query: &[f32]) -> Result<RetrievalOutcome> {
        self.retrieve_relevant(namespace, query, self.config.top_k, self.config.threshold)
    }
}
