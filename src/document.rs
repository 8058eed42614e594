use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::sparse::SparseVector;

/// Metadata keys shared by documents, nodes and stored chunks.
pub mod keys {
    pub const FILE_PATH: &str = "file_path";
    pub const FILE_NAME: &str = "file_name";
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const REVIEW_TEXT: &str = "review_text";
    pub const ORIGINAL_TEXT: &str = "original_text";
}

pub type Metadata = BTreeMap<String, String>;

/// A source document as handed over by the document source.
///
/// `id` is the stable identity used by the manifest and by the vector store
/// to group chunks; for files it is the path the walker produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Build a document for a file on disk, filling the file metadata keys.
    pub fn from_file(path: &Path, text: String) -> Self {
        let id = path.to_string_lossy().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| id.clone());

        let mut metadata = Metadata::new();
        metadata.insert(keys::FILE_PATH.to_string(), id.clone());
        metadata.insert(keys::FILE_NAME.to_string(), file_name);

        Self { id, text, metadata }
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.id)
    }
}

/// A unit of text flowing through the ingestion pipeline.
///
/// Nodes start out as whole documents and are narrowed by each stage until
/// they hold the normalized text of a single review.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub ref_doc_id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl From<&Document> for Node {
    fn from(doc: &Document) -> Self {
        Self {
            ref_doc_id: doc.id.clone(),
            text: doc.text.clone(),
            metadata: doc.metadata.clone(),
        }
    }
}

/// The unit stored in the vector backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: u64,
    pub ref_doc_id: String,
    pub text: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub metadata: Metadata,
}
