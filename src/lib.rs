//! simple-rag - a retrieval backend for review datasets.
//!
//! simple-rag parses `name= category= text=` review records out of plain text
//! datasets, normalizes them to lemma sequences, and indexes them in a hybrid
//! vector store: dense embeddings next to sparse TF-IDF vectors. Re-indexing
//! is incremental, driven by a manifest of per-file fingerprints.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use simple_rag::{DataDir, Settings, walker};
//! use simple_rag::pipeline::Pipeline;
//! use simple_rag::search::QueryCoordinator;
//! use simple_rag::sparse::SparseVectorEncoder;
//! use simple_rag::sync::{IndexSynchronizer, SyncOptions};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let settings = Settings::resolve(&data_dir, None).unwrap();
//! let normalizer = Arc::new(settings.build_normalizer(&data_dir).unwrap());
//!
//! let mut synchronizer = IndexSynchronizer::new(
//!     settings.build_store(&data_dir).unwrap(),
//!     settings.build_embedder().unwrap(),
//!     SparseVectorEncoder::open(&data_dir.vocabulary_file().unwrap()).unwrap(),
//!     Pipeline::reviews(settings.record_parser(), normalizer.clone()),
//!     SyncOptions {
//!         collection: settings.vector_store.collection.clone(),
//!         batch_size: settings.vector_store.batch_size,
//!         hybrid: settings.vector_store.enable_hybrid,
//!         manifest_path: data_dir.manifest_file().unwrap(),
//!         prune_deleted: false,
//!     },
//! );
//! let documents =
//!     walker::list_documents(&data_dir.datasets_dir(), &settings.extensions()).unwrap();
//! println!("{}", synchronizer.synchronize(documents).unwrap());
//!
//! let coordinator =
//!     QueryCoordinator::from_settings(&settings, &data_dir, normalizer).unwrap();
//! for hit in coordinator.query("уютное кафе", 3, 3).unwrap() {
//!     println!("{} ({:.3}): {}", hit.additional_metadata.name, hit.score, hit.text);
//! }
//! ```

pub mod cli;
pub mod data_dir;
pub mod doc_id;
pub mod document;
pub mod embedding;
pub mod error;
pub mod incremental;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod search;
pub mod server;
pub mod settings;
pub mod sparse;
pub mod store;
pub mod sync;
pub mod walker;

pub use data_dir::DataDir;
pub use doc_id::ChunkId;
pub use document::{Document, IndexedChunk};
pub use error::{Error, Result};
pub use normalize::TextNormalizer;
pub use record::{ReviewRecord, ReviewRecordParser};
pub use search::{QueryCoordinator, QueryResult};
pub use settings::Settings;
pub use sparse::{SparseVector, SparseVectorEncoder};
pub use store::VectorStore;
pub use sync::{IndexSynchronizer, SyncOutcome};
