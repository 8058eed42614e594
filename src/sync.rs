//! Keeps a vector store collection in step with a document set.
//!
//! The first pass builds the collection from every document. Later passes
//! consult the manifest and rebuild only the documents that are new or whose
//! fingerprint changed, replacing their points document by document.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use crate::{
    doc_id::ChunkId,
    document::{Document, IndexedChunk, Node},
    embedding::Embedder,
    error::{Error, Result},
    incremental::{Manifest, filter_new_or_changed},
    pipeline::Pipeline,
    sparse::{SparseVector, SparseVectorEncoder},
    store::{CollectionSpec, VectorStore},
};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub collection: String,
    /// Points per upsert request and texts per embedding request.
    pub batch_size: usize,
    /// Store sparse TF-IDF vectors next to the dense ones.
    pub hybrid: bool,
    pub manifest_path: PathBuf,
    /// Delete points of documents that disappeared since the last pass.
    pub prune_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was supplied; nothing was touched.
    NoDocuments,
    /// The collection did not exist and was built from every document.
    Created { documents: usize, chunks: usize },
    /// The collection exists and no document changed.
    Unchanged,
    /// Every changed document was replaced in the collection.
    Refreshed {
        documents: usize,
        chunks: usize,
        pruned: usize,
    },
    /// At least one document could not be replaced.
    RefreshFailed { failed: Vec<String> },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::RefreshFailed { .. })
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDocuments => write!(f, "no documents to index"),
            Self::Created { documents, chunks } => {
                write!(f, "created index: {documents} documents, {chunks} chunks")
            }
            Self::Unchanged => write!(f, "index is up to date"),
            Self::Refreshed {
                documents,
                chunks,
                pruned,
            } => {
                write!(f, "refreshed {documents} documents ({chunks} chunks)")?;
                if *pruned > 0 {
                    write!(f, ", pruned {pruned}")?;
                }
                Ok(())
            }
            Self::RefreshFailed { failed } => {
                write!(f, "refresh failed for {} documents: {}", failed.len(), failed.join(", "))
            }
        }
    }
}

/// Drives the ingestion pipeline into a vector store collection.
pub struct IndexSynchronizer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    encoder: SparseVectorEncoder,
    pipeline: Pipeline,
    options: SyncOptions,
}

impl IndexSynchronizer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        encoder: SparseVectorEncoder,
        pipeline: Pipeline,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            encoder,
            pipeline,
            options,
        }
    }

    pub fn encoder(&self) -> &SparseVectorEncoder {
        &self.encoder
    }

    pub fn into_encoder(self) -> SparseVectorEncoder {
        self.encoder
    }

    /// Create the collection from `documents`, or refresh the ones that
    /// changed since the last pass.
    pub fn synchronize(&mut self, documents: Vec<Document>) -> Result<SyncOutcome> {
        if documents.is_empty() {
            tracing::info!("no documents supplied, skipping index synchronization");
            return Ok(SyncOutcome::NoDocuments);
        }

        if self.store.collection_exists(&self.options.collection)? {
            self.refresh(documents)
        } else {
            self.create(documents)
        }
    }

    fn create(&mut self, documents: Vec<Document>) -> Result<SyncOutcome> {
        // Fingerprint first so a vanished file aborts before any write.
        let manifest = Manifest::build(&documents)?;

        let nodes = self.pipeline.run(&documents);
        let chunks = self.index_nodes(nodes)?;

        self.store.create_collection(&CollectionSpec {
            name: self.options.collection.clone(),
            dense_dimension: self.embedder.dimension(),
            hybrid: self.options.hybrid,
        })?;
        for batch in chunks.chunks(self.batch_size()) {
            self.store.upsert(&self.options.collection, batch)?;
        }

        manifest.save(&self.options.manifest_path)?;
        tracing::info!(
            collection = %self.options.collection,
            documents = documents.len(),
            chunks = chunks.len(),
            "built collection"
        );
        Ok(SyncOutcome::Created {
            documents: documents.len(),
            chunks: chunks.len(),
        })
    }

    fn refresh(&mut self, documents: Vec<Document>) -> Result<SyncOutcome> {
        let vanished = if self.options.prune_deleted {
            Manifest::load(&self.options.manifest_path)?
                .map(|m| m.vanished(&documents))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let changed = filter_new_or_changed(documents, &self.options.manifest_path)?;
        let mut failed = Vec::new();

        let mut pruned = 0;
        for identity in &vanished {
            match self.store.delete_document(&self.options.collection, identity) {
                Ok(()) => pruned += 1,
                Err(e) => {
                    tracing::warn!(document = %identity, error = %e, "failed to prune document");
                    failed.push(identity.clone());
                }
            }
        }

        if changed.is_empty() && vanished.is_empty() {
            tracing::info!(collection = %self.options.collection, "index is up to date");
            return Ok(SyncOutcome::Unchanged);
        }

        let nodes = self.pipeline.run(&changed);
        let chunks = self.index_nodes(nodes)?;
        let chunk_count = chunks.len();

        let mut by_document: HashMap<String, Vec<IndexedChunk>> = HashMap::new();
        for chunk in chunks {
            by_document
                .entry(chunk.ref_doc_id.clone())
                .or_default()
                .push(chunk);
        }

        for doc in &changed {
            let chunks = by_document.remove(&doc.id).unwrap_or_default();
            if let Err(e) = self.replace_document(&doc.id, &chunks) {
                tracing::warn!(document = %doc.id, error = %e, "failed to refresh document");
                failed.push(doc.id.clone());
            } else {
                tracing::debug!(document = %doc.id, chunks = chunks.len(), "refreshed document");
            }
        }

        if !failed.is_empty() {
            return Ok(SyncOutcome::RefreshFailed { failed });
        }

        tracing::info!(
            collection = %self.options.collection,
            documents = changed.len(),
            chunks = chunk_count,
            pruned,
            "refreshed collection"
        );
        Ok(SyncOutcome::Refreshed {
            documents: changed.len(),
            chunks: chunk_count,
            pruned,
        })
    }

    fn replace_document(&self, identity: &str, chunks: &[IndexedChunk]) -> Result<()> {
        self.store.delete_document(&self.options.collection, identity)?;
        for batch in chunks.chunks(self.batch_size()) {
            self.store.upsert(&self.options.collection, batch)?;
        }
        Ok(())
    }

    /// Turn pipeline output into storable chunks: sparse vectors from a
    /// vocabulary refit on exactly these nodes, dense vectors from the
    /// embedder, ids from (document, ordinal within document).
    fn index_nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<IndexedChunk>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let sparse = if self.options.hybrid {
            self.encoder.fit_and_encode(&texts)?
        } else {
            vec![SparseVector::default(); texts.len()]
        };

        let mut dense = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size()) {
            dense.extend(self.embedder.embed(batch)?);
        }
        if dense.len() != texts.len() {
            return Err(Error::BackingStore(format!(
                "embedder returned {} vectors for {} texts",
                dense.len(),
                texts.len()
            )));
        }

        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let chunks = nodes
            .into_iter()
            .zip(dense)
            .zip(sparse)
            .map(|((node, dense), sparse)| {
                let ordinal = ordinals.entry(node.ref_doc_id.clone()).or_default();
                let id = ChunkId::new(&node.ref_doc_id, *ordinal);
                *ordinal += 1;
                IndexedChunk {
                    id: id.numeric,
                    ref_doc_id: node.ref_doc_id,
                    text: node.text,
                    dense,
                    sparse,
                    metadata: node.metadata,
                }
            })
            .collect();
        Ok(chunks)
    }

    fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("pipeline", &self.pipeline)
            .field("encoder", &self.encoder)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
