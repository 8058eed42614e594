use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{CollectionSpec, HybridQuery, QueryMode, ScoredPoint, VectorStore};
use crate::{
    document::{IndexedChunk, Metadata},
    error::{Error, Result},
    sparse::SparseVector,
};

const DENSE_VECTOR: &str = "text-dense";
const SPARSE_VECTOR: &str = "text-sparse";
const DOC_ID_KEY: &str = "doc_id";
const TEXT_KEY: &str = "text";

/// Qdrant collections driven through the REST API.
///
/// Points carry a named dense vector and, for hybrid collections, a named
/// sparse vector. The payload holds `doc_id`, `text` and every metadata entry
/// as a string.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl QdrantStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .map_err(|e| Error::BackingStore(format!("qdrant unreachable: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::BackingStore(format!("qdrant response: {e}")))?;
        if !status.is_success() {
            return Err(Error::BackingStore(format!("qdrant returned {status}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn sparse_json(vector: &SparseVector) -> Value {
    json!({ "indices": vector.indices, "values": vector.weights })
}

fn point_json(chunk: &IndexedChunk, hybrid: bool) -> Value {
    let mut payload: Map<String, Value> = chunk
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    payload.insert(DOC_ID_KEY.into(), Value::String(chunk.ref_doc_id.clone()));
    payload.insert(TEXT_KEY.into(), Value::String(chunk.text.clone()));

    let mut vector = Map::new();
    vector.insert(DENSE_VECTOR.into(), json!(chunk.dense));
    if hybrid {
        vector.insert(SPARSE_VECTOR.into(), sparse_json(&chunk.sparse));
    }

    json!({ "id": chunk.id, "vector": vector, "payload": payload })
}

fn collection_json(spec: &CollectionSpec) -> Value {
    let mut body = json!({
        "vectors": {
            DENSE_VECTOR: { "size": spec.dense_dimension, "distance": "Cosine" }
        }
    });
    if spec.hybrid {
        body["sparse_vectors"] = json!({ SPARSE_VECTOR: {} });
    }
    body
}

fn query_json(query: &HybridQuery) -> Value {
    let dense = json!({
        "query": query.dense,
        "using": DENSE_VECTOR,
        "limit": query.dense_top_k,
    });
    let sparse = json!({
        "query": sparse_json(&query.sparse),
        "using": SPARSE_VECTOR,
        "limit": query.sparse_top_k,
    });

    let mut body = match query.mode {
        QueryMode::Dense => dense,
        QueryMode::Sparse => sparse,
        QueryMode::Hybrid => json!({
            "prefetch": [dense, sparse],
            "query": { "fusion": "rrf" },
            "limit": query.limit(),
        }),
    };
    body["with_payload"] = Value::Bool(true);
    body
}

fn scored_point(raw: RawPoint) -> ScoredPoint {
    let mut text = String::new();
    let mut metadata = Metadata::new();
    for (key, value) in raw.payload.unwrap_or_default() {
        let Value::String(value) = value else {
            continue;
        };
        match key.as_str() {
            TEXT_KEY => text = value,
            DOC_ID_KEY => {}
            _ => {
                metadata.insert(key, value);
            }
        }
    }

    ScoredPoint {
        id: raw.id.as_u64().unwrap_or_default(),
        score: raw.score,
        text,
        metadata,
    }
}

impl VectorStore for QdrantStore {
    fn collection_exists(&self, name: &str) -> Result<bool> {
        let body = self.send(
            self.client
                .get(self.url(&format!("/collections/{name}/exists"))),
        )?;
        let envelope: Envelope<ExistsResult> = serde_json::from_value(body)?;
        Ok(envelope.result.exists)
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.collection_exists(&spec.name)? {
            return Err(Error::CollectionExists(spec.name.clone()));
        }
        self.send(
            self.client
                .put(self.url(&format!("/collections/{}", spec.name)))
                .json(&collection_json(spec)),
        )?;
        tracing::info!(collection = %spec.name, hybrid = spec.hybrid, "created qdrant collection");
        Ok(())
    }

    fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let hybrid = chunks.iter().any(|c| !c.sparse.is_empty());
        let points: Vec<Value> = chunks.iter().map(|c| point_json(c, hybrid)).collect();
        self.send(
            self.client
                .put(self.url(&format!("/collections/{collection}/points?wait=true")))
                .json(&json!({ "points": points })),
        )?;
        Ok(())
    }

    fn delete_document(&self, collection: &str, ref_doc_id: &str) -> Result<()> {
        let filter = json!({
            "filter": {
                "must": [{ "key": DOC_ID_KEY, "match": { "value": ref_doc_id } }]
            }
        });
        self.send(
            self.client
                .post(self.url(&format!(
                    "/collections/{collection}/points/delete?wait=true"
                )))
                .json(&filter),
        )?;
        Ok(())
    }

    fn query(&self, collection: &str, query: &HybridQuery) -> Result<Vec<ScoredPoint>> {
        let body = self.send(
            self.client
                .post(self.url(&format!("/collections/{collection}/points/query")))
                .json(&query_json(query)),
        )?;
        let envelope: Envelope<QueryResult> = serde_json::from_value(body)?;
        Ok(envelope.result.points.into_iter().map(scored_point).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(mode: QueryMode) -> HybridQuery {
        HybridQuery {
            dense: vec![0.5, 0.5],
            sparse: SparseVector {
                indices: vec![3, 9],
                weights: vec![0.6, 0.8],
            },
            dense_top_k: 3,
            sparse_top_k: 4,
            mode,
        }
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let store = QdrantStore::new("http://localhost:6333/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.url("/collections/x/exists"),
            "http://localhost:6333/collections/x/exists"
        );
    }

    #[test]
    fn hybrid_collection_declares_sparse_vectors() {
        let body = collection_json(&CollectionSpec {
            name: "user_reviews".into(),
            dense_dimension: 384,
            hybrid: true,
        });
        assert_eq!(body["vectors"]["text-dense"]["size"], 384);
        assert_eq!(body["vectors"]["text-dense"]["distance"], "Cosine");
        assert!(body["sparse_vectors"]["text-sparse"].is_object());
    }

    #[test]
    fn dense_collection_has_no_sparse_vectors() {
        let body = collection_json(&CollectionSpec {
            name: "user_reviews".into(),
            dense_dimension: 8,
            hybrid: false,
        });
        assert!(body.get("sparse_vectors").is_none());
    }

    #[test]
    fn point_payload_carries_document_and_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".into(), "reviews.txt".into());
        let chunk = IndexedChunk {
            id: 42,
            ref_doc_id: "datasets/reviews.txt".into(),
            text: "great coffee".into(),
            dense: vec![1.0, 0.0],
            sparse: SparseVector {
                indices: vec![1],
                weights: vec![1.0],
            },
            metadata,
        };

        let body = point_json(&chunk, true);
        assert_eq!(body["id"], 42);
        assert_eq!(body["payload"]["doc_id"], "datasets/reviews.txt");
        assert_eq!(body["payload"]["text"], "great coffee");
        assert_eq!(body["payload"]["file_name"], "reviews.txt");
        assert_eq!(body["vector"]["text-sparse"]["indices"], json!([1]));
    }

    #[test]
    fn hybrid_query_uses_prefetch_and_rrf() {
        let body = query_json(&query(QueryMode::Hybrid));
        assert_eq!(body["query"]["fusion"], "rrf");
        assert_eq!(body["limit"], 3);
        assert_eq!(body["prefetch"][0]["using"], "text-dense");
        assert_eq!(body["prefetch"][1]["using"], "text-sparse");
        assert_eq!(body["prefetch"][1]["limit"], 4);
        assert_eq!(body["prefetch"][1]["query"]["values"], json!([0.6f32, 0.8f32]));
        assert_eq!(body["with_payload"], true);
    }

    #[test]
    fn sparse_query_targets_sparse_vector() {
        let body = query_json(&query(QueryMode::Sparse));
        assert_eq!(body["using"], "text-sparse");
        assert_eq!(body["limit"], 4);
        assert!(body.get("prefetch").is_none());
    }

    #[test]
    fn response_points_become_scored_points() {
        let raw: Envelope<QueryResult> = serde_json::from_value(json!({
            "result": { "points": [{
                "id": 7,
                "score": 0.5,
                "payload": {
                    "doc_id": "a.txt",
                    "text": "great coffee",
                    "name": "Blue Cafe",
                    "rank": 3
                }
            }]},
            "status": "ok"
        }))
        .unwrap();

        let points: Vec<ScoredPoint> =
            raw.result.points.into_iter().map(scored_point).collect();
        assert_eq!(points[0].id, 7);
        assert_eq!(points[0].text, "great coffee");
        assert_eq!(points[0].metadata["name"], "Blue Cafe");
        assert!(!points[0].metadata.contains_key("doc_id"));
        assert!(!points[0].metadata.contains_key("rank"));
    }
}
