use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const API_KEY_ENV_VAR: &str = "SIMPLE_RAG_EMBEDDING_API_KEY";

/// Produces dense embeddings for batches of text.
pub trait Embedder: Send + Sync {
    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::BackingStore("embedder returned no vectors".into()))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each whitespace-separated token adds ±1 to a bucket chosen from its
/// SHA-256 digest; the result is L2-normalized. Stable across processes and
/// platforms, so vectors stored by one run stay comparable with queries from
/// the next.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        url: String,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url,
            model,
            dimension,
            api_key: std::env::var(API_KEY_ENV_VAR).ok(),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let mut response: EmbeddingResponse =
            request.send()?.error_for_status()?.json()?;
        response.data.sort_by_key(|item| item.index);

        if response.data.len() != texts.len() {
            return Err(Error::BackingStore(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }
        if let Some(bad) = response
            .data
            .iter()
            .find(|item| item.embedding.len() != self.dimension)
        {
            return Err(Error::Config(format!(
                "embedding dimension mismatch: configured {}, endpoint returned {}",
                self.dimension,
                bad.embedding.len()
            )));
        }

        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_one("пример текст").unwrap();
        let b = embedder.embed_one("пример текст").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hashing_output_is_unit_length() {
        let embedder = HashingEmbedder::new(32);
        let v = embedder.embed_one("one two three four").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed_one("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn batch_preserves_order() {
        let embedder = HashingEmbedder::new(16);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed(&texts).unwrap();
        assert_eq!(batch[0], embedder.embed_one("alpha").unwrap());
        assert_eq!(batch[1], embedder.embed_one("beta").unwrap());
    }
}
