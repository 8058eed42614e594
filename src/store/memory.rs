use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};

use super::{
    CollectionSpec,
    HybridQuery,
    QueryMode,
    RRF_K,
    ScoredPoint,
    VectorStore,
    reciprocal_rank_fusion,
};
use crate::{
    data_dir::write_atomic,
    document::IndexedChunk,
    error::{Error, Result},
};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    version: u32,
    collections: BTreeMap<String, Collection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Collection {
    spec: CollectionSpec,
    points: BTreeMap<u64, IndexedChunk>,
}

/// In-process vector store with brute-force search.
///
/// Dense similarity is cosine, sparse similarity is the dot product of the
/// TF-IDF vectors. When opened on a file, the whole store is rewritten to it
/// after every mutation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Collections>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted at `path`, starting empty if the file does not
    /// exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let state = match std::fs::read(path) {
            Ok(bytes) => {
                let state: Collections =
                    serde_json::from_slice(&bytes).map_err(|e| Error::CorruptCache {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                if state.version > SNAPSHOT_VERSION {
                    return Err(Error::CorruptCache {
                        path: path.to_path_buf(),
                        reason: format!("unsupported version {}", state.version),
                    });
                }
                tracing::debug!(
                    path = %path.display(),
                    collections = state.collections.len(),
                    "loaded local vector store"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections {
                version: SNAPSHOT_VERSION,
                collections: BTreeMap::new(),
            },
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Number of points stored in `collection`.
    pub fn point_count(&self, collection: &str) -> Result<usize> {
        let state = self.read()?;
        Ok(state.collections.get(collection).map_or(0, |c| c.points.len()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.state
            .read()
            .map_err(|_| Error::BackingStore("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.state
            .write()
            .map_err(|_| Error::BackingStore("store lock poisoned".into()))
    }

    fn persist(&self, state: &Collections) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(state)?;
        write_atomic(path, &bytes)
    }
}

fn missing(collection: &str) -> Error {
    Error::NotFound {
        kind: "collection",
        name: collection.to_string(),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Rank every point by `score`, best first, ties broken by id.
fn rank(
    collection: &Collection,
    limit: usize,
    score: impl Fn(&IndexedChunk) -> Option<f32>,
) -> Vec<ScoredPoint> {
    let mut hits: Vec<ScoredPoint> = collection
        .points
        .values()
        .filter_map(|chunk| {
            score(chunk).map(|score| ScoredPoint {
                id: chunk.id,
                score,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            })
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    hits.truncate(limit);
    hits
}

impl VectorStore for MemoryStore {
    fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.collections.contains_key(name))
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut state = self.write()?;
        if state.collections.contains_key(&spec.name) {
            return Err(Error::CollectionExists(spec.name.clone()));
        }
        state.version = SNAPSHOT_VERSION;
        state.collections.insert(spec.name.clone(), Collection {
            spec: spec.clone(),
            points: BTreeMap::new(),
        });
        tracing::info!(collection = %spec.name, hybrid = spec.hybrid, "created collection");
        self.persist(&state)
    }

    fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()> {
        let mut state = self.write()?;
        let target = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = chunks
            .iter()
            .find(|c| c.dense.len() != target.spec.dense_dimension)
        {
            return Err(Error::BackingStore(format!(
                "collection {collection} expects {}-dimensional vectors, got {}",
                target.spec.dense_dimension,
                bad.dense.len()
            )));
        }

        for chunk in chunks {
            target.points.insert(chunk.id, chunk.clone());
        }
        self.persist(&state)
    }

    fn delete_document(&self, collection: &str, ref_doc_id: &str) -> Result<()> {
        let mut state = self.write()?;
        let target = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        let before = target.points.len();
        target.points.retain(|_, chunk| chunk.ref_doc_id != ref_doc_id);
        tracing::debug!(
            collection,
            document = ref_doc_id,
            removed = before - target.points.len(),
            "deleted document points"
        );
        self.persist(&state)
    }

    fn query(&self, collection: &str, query: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        let state = self.read()?;
        let target = state
            .collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;

        if query.mode.uses_sparse() && !target.spec.hybrid {
            return Err(Error::BackingStore(format!(
                "collection {collection} has no sparse vectors"
            )));
        }

        let dense = || {
            rank(target, query.dense_top_k, |chunk| {
                Some(cosine(&query.dense, &chunk.dense))
            })
        };
        let sparse = || {
            rank(target, query.sparse_top_k, |chunk| {
                let score = query.sparse.dot(&chunk.sparse);
                (score > 0.0).then_some(score)
            })
        };

        let hits = match query.mode {
            QueryMode::Dense => dense(),
            QueryMode::Sparse => sparse(),
            QueryMode::Hybrid => {
                let mut fused = reciprocal_rank_fusion(&[dense(), sparse()], RRF_K);
                fused.truncate(query.limit());
                fused
            }
        };
        Ok(hits)
    }
}
