use std::sync::Arc;

use serde::Serialize;

use crate::{
    data_dir::DataDir,
    document::{Metadata, keys},
    embedding::Embedder,
    error::Result,
    normalize::TextNormalizer,
    settings::Settings,
    sparse::{SparseVector, SparseVectorEncoder},
    store::{HybridQuery, QueryMode, ScoredPoint, VectorStore},
};

/// One hit as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// File name of the dataset the review came from.
    pub dataset: String,
    /// The original, un-normalized review text.
    pub text: String,
    pub score: f32,
    pub additional_metadata: AdditionalMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdditionalMetadata {
    pub name: String,
    pub category: String,
}

impl From<ScoredPoint> for QueryResult {
    fn from(hit: ScoredPoint) -> Self {
        let mut metadata: Metadata = hit.metadata;
        let field = |m: &mut Metadata, key: &str| m.remove(key).unwrap_or_default();

        let dataset = field(&mut metadata, keys::FILE_NAME);
        let text = metadata.remove(keys::REVIEW_TEXT).unwrap_or(hit.text);
        Self {
            dataset,
            text,
            score: hit.score,
            additional_metadata: AdditionalMetadata {
                name: field(&mut metadata, keys::NAME),
                category: field(&mut metadata, keys::CATEGORY),
            },
        }
    }
}

/// Answers free-text queries against an indexed collection.
pub struct QueryCoordinator {
    normalizer: Arc<TextNormalizer>,
    encoder: Arc<SparseVectorEncoder>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    mode: QueryMode,
}

impl QueryCoordinator {
    pub fn new(
        normalizer: Arc<TextNormalizer>,
        encoder: Arc<SparseVectorEncoder>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        mode: QueryMode,
    ) -> Self {
        Self {
            normalizer,
            encoder,
            embedder,
            store,
            collection: collection.into(),
            mode,
        }
    }

    /// Build a coordinator over the configured store, embedder and the
    /// vocabulary cached in `data_dir`.
    pub fn from_settings(
        settings: &Settings,
        data_dir: &DataDir,
        normalizer: Arc<TextNormalizer>,
    ) -> Result<Self> {
        let encoder = SparseVectorEncoder::open(&data_dir.vocabulary_file()?)?;
        if !encoder.is_fitted() && settings.query.mode.uses_sparse() {
            tracing::warn!("no TF-IDF vocabulary yet; run `simple-rag index` before querying");
        }
        Ok(Self::new(
            normalizer,
            Arc::new(encoder),
            settings.build_embedder()?,
            settings.build_store(data_dir)?,
            settings.vector_store.collection.clone(),
            settings.query.mode,
        ))
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Normalize `text` exactly as indexed text was, query the store and
    /// return at most `dense_top_k` hits (`sparse_top_k` in sparse mode),
    /// best first.
    ///
    /// A query that normalizes to nothing is still sent to the store.
    pub fn query(
        &self,
        text: &str,
        dense_top_k: usize,
        sparse_top_k: usize,
    ) -> Result<Vec<QueryResult>> {
        let normalized = self.normalizer.normalize_joined(text);

        let dense = self.embedder.embed_one(&normalized)?;
        let sparse = if self.mode.uses_sparse() {
            self.encoder
                .encode_query(std::slice::from_ref(&normalized))?
                .pop()
                .unwrap_or_default()
        } else {
            SparseVector::default()
        };

        let query = HybridQuery {
            dense,
            sparse,
            dense_top_k,
            sparse_top_k,
            mode: self.mode,
        };
        let hits = self.store.query(&self.collection, &query)?;
        tracing::debug!(
            query = %normalized,
            mode = ?self.mode,
            hits = hits.len(),
            "queried collection"
        );

        let mut results: Vec<QueryResult> = hits.into_iter().map(QueryResult::from).collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(query.limit());
        Ok(results)
    }
}

impl std::fmt::Debug for QueryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCoordinator")
            .field("collection", &self.collection)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
