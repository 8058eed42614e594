//! Vector store abstraction and its backends.
//!
//! The core only talks to [`VectorStore`]; [`memory::MemoryStore`] keeps
//! everything in process (optionally snapshotted to a file) and
//! [`qdrant::QdrantStore`] drives a Qdrant server over its REST API.

pub mod memory;
pub mod qdrant;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    document::{IndexedChunk, Metadata},
    error::Result,
    sparse::SparseVector,
};

/// Rank constant for reciprocal-rank fusion.
pub const RRF_K: f32 = 60.0;

/// How dense and sparse rankings are used to answer a query.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Dense embedding similarity only.
    Dense,
    /// Sparse TF-IDF similarity only.
    Sparse,
    /// Both rankings combined with reciprocal-rank fusion.
    #[default]
    Hybrid,
}

impl QueryMode {
    pub fn uses_sparse(self) -> bool {
        matches!(self, Self::Sparse | Self::Hybrid)
    }

    pub fn uses_dense(self) -> bool {
        matches!(self, Self::Dense | Self::Hybrid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dense_dimension: usize,
    /// Whether points carry sparse vectors alongside dense ones.
    pub hybrid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub mode: QueryMode,
}

impl HybridQuery {
    /// Number of hits the query returns at most.
    pub fn limit(&self) -> usize {
        match self.mode {
            QueryMode::Sparse => self.sparse_top_k,
            QueryMode::Dense | QueryMode::Hybrid => self.dense_top_k,
        }
    }
}

/// A ranked hit returned by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

/// A collection-oriented hybrid vector store.
pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection. Fails with `CollectionExists` if it is already
    /// there.
    fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Insert or replace points by id.
    fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()>;

    /// Delete every point that belongs to `ref_doc_id`.
    fn delete_document(&self, collection: &str, ref_doc_id: &str) -> Result<()>;

    fn query(&self, collection: &str, query: &HybridQuery) -> Result<Vec<ScoredPoint>>;
}

/// Fuse rankings by summing `1 / (k + rank)` per point, rank starting at 1.
///
/// The fused score replaces the original one. Ties keep the order in which
/// points were first seen.
pub fn reciprocal_rank_fusion(rankings: &[Vec<ScoredPoint>], k: f32) -> Vec<ScoredPoint> {
    let mut order: Vec<u64> = Vec::new();
    let mut merged: HashMap<u64, ScoredPoint> = HashMap::new();

    for ranking in rankings {
        for (i, point) in ranking.iter().enumerate() {
            let contribution = 1.0 / (k + (i + 1) as f32);
            merged
                .entry(point.id)
                .and_modify(|p| p.score += contribution)
                .or_insert_with(|| {
                    order.push(point.id);
                    ScoredPoint {
                        score: contribution,
                        ..point.clone()
                    }
                });
        }
    }

    let mut fused: Vec<ScoredPoint> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect();
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}
