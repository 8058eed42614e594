//! TF-IDF sparse vectors for the sparse half of hybrid search.
//!
//! Weighting follows the usual smoothed TF-IDF recipe: raw term counts,
//! `idf = ln((1 + n) / (1 + df)) + 1`, and L2 normalization per text. Terms
//! are runs of two or more word characters of the lowercased text, and the
//! vocabulary is ordered lexicographically so the index of a term is its
//! position in that order.
//!
//! The fitted vocabulary is replaced wholesale by every
//! [`SparseVectorEncoder::fit_and_encode`] call. Vectors produced before a
//! refit are not guaranteed to share an index space with vectors produced
//! after it.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    data_dir::write_atomic,
    error::{Error, Result},
};

const CACHE_FORMAT: &str = "simple-rag/tfidf";
const CACHE_VERSION: u32 = 1;

static TERM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\w\w+\b").expect("term pattern is a valid regex")
});

/// Nonzero term weights over the fitted vocabulary.
///
/// `indices` is strictly ascending and `weights[i]` belongs to `indices[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

impl SparseVector {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product of two vectors over the same vocabulary.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.weights[i] * other.weights[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// A fitted vocabulary: term → (index, idf).
#[derive(Debug, Clone, PartialEq)]
struct Vocabulary {
    terms: HashMap<String, (u32, f32)>,
    document_count: usize,
}

impl Vocabulary {
    fn fit(texts: &[String]) -> Result<Self> {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for text in texts {
            let unique: BTreeSet<String> = terms(text).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        if document_frequency.is_empty() {
            return Err(Error::EmptyVocabulary);
        }

        let n = texts.len() as f32;
        let terms = document_frequency
            .into_iter()
            .enumerate()
            .map(|(index, (term, df))| {
                let idf = ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0;
                (term, (index as u32, idf))
            })
            .collect();

        Ok(Self {
            terms,
            document_count: texts.len(),
        })
    }

    fn encode(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, (usize, f32)> = BTreeMap::new();
        for term in terms(text) {
            if let Some(&(index, idf)) = self.terms.get(&term) {
                counts.entry(index).or_insert((0, idf)).0 += 1;
            }
        }

        let raw: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(index, (count, idf))| (index, count as f32 * idf))
            .collect();
        let norm = raw.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();

        let mut vector = SparseVector::default();
        for (index, weight) in raw {
            let weight = if norm > 0.0 { weight / norm } else { weight };
            if weight != 0.0 {
                vector.indices.push(index);
                vector.weights.push(weight);
            }
        }
        vector
    }

    fn to_file(&self) -> VocabularyFile {
        let mut terms: Vec<(&String, &(u32, f32))> = self.terms.iter().collect();
        terms.sort_by_key(|(_, (index, _))| *index);
        VocabularyFile {
            format: CACHE_FORMAT.to_string(),
            version: CACHE_VERSION,
            document_count: self.document_count,
            terms: terms
                .into_iter()
                .map(|(term, &(_, idf))| TermEntry {
                    term: term.clone(),
                    idf,
                })
                .collect(),
        }
    }

    fn from_file(file: VocabularyFile) -> Self {
        let terms = file
            .terms
            .into_iter()
            .enumerate()
            .map(|(index, entry)| (entry.term, (index as u32, entry.idf)))
            .collect();
        Self {
            terms,
            document_count: file.document_count,
        }
    }
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    TERM_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
}

/// On-disk layout of the vocabulary cache. Term index = position in `terms`.
#[derive(Debug, Serialize, Deserialize)]
struct VocabularyFile {
    format: String,
    version: u32,
    document_count: usize,
    terms: Vec<TermEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TermEntry {
    term: String,
    idf: f32,
}

/// Owns the fitted TF-IDF vocabulary and its cache file.
#[derive(Debug)]
pub struct SparseVectorEncoder {
    cache_path: Option<PathBuf>,
    vocabulary: Option<Vocabulary>,
}

impl SparseVectorEncoder {
    /// An encoder with no cache file and no vocabulary.
    pub fn in_memory() -> Self {
        Self {
            cache_path: None,
            vocabulary: None,
        }
    }

    /// Open the encoder backed by `cache_path`, loading the vocabulary if the
    /// file exists.
    ///
    /// A cache that cannot be parsed is fatal: the operator must delete it.
    pub fn open(cache_path: &Path) -> Result<Self> {
        let vocabulary = match std::fs::read(cache_path) {
            Ok(bytes) => Some(Self::decode_cache(cache_path, &bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(vocab) = &vocabulary {
            tracing::debug!(
                path = %cache_path.display(),
                terms = vocab.terms.len(),
                "loaded TF-IDF vocabulary"
            );
        }

        Ok(Self {
            cache_path: Some(cache_path.to_path_buf()),
            vocabulary,
        })
    }

    fn decode_cache(path: &Path, bytes: &[u8]) -> Result<Vocabulary> {
        let corrupt = |reason: String| Error::CorruptCache {
            path: path.to_path_buf(),
            reason,
        };

        let file: VocabularyFile =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.format != CACHE_FORMAT {
            return Err(corrupt(format!("unexpected format `{}`", file.format)));
        }
        if file.version > CACHE_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (newest known is {CACHE_VERSION})",
                file.version
            )));
        }
        Ok(Vocabulary::from_file(file))
    }

    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    /// Number of terms in the fitted vocabulary, zero when unfitted.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.as_ref().map_or(0, |v| v.terms.len())
    }

    /// Index of `term` in the fitted vocabulary.
    pub fn term_index(&self, term: &str) -> Option<u32> {
        self.vocabulary
            .as_ref()
            .and_then(|v| v.terms.get(term))
            .map(|&(index, _)| index)
    }

    /// Refit the vocabulary on `texts`, persist it, and encode the batch.
    pub fn fit_and_encode(&mut self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let vocabulary = Vocabulary::fit(texts)?;
        let vectors = texts.iter().map(|t| vocabulary.encode(t)).collect();

        self.vocabulary = Some(vocabulary);
        self.save()?;

        tracing::info!(
            documents = texts.len(),
            terms = self.vocabulary_size(),
            "fitted TF-IDF vocabulary"
        );
        Ok(vectors)
    }

    /// Encode against the current vocabulary without refitting.
    pub fn encode_query(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let vocabulary =
            self.vocabulary.as_ref().ok_or(Error::VocabularyUnavailable)?;
        Ok(texts.iter().map(|t| vocabulary.encode(t)).collect())
    }

    /// Write the vocabulary to the cache file, if there is one.
    pub fn save(&self) -> Result<()> {
        let (Some(path), Some(vocabulary)) = (&self.cache_path, &self.vocabulary)
        else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(&vocabulary.to_file())?;
        write_atomic(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn query_before_fit_fails() {
        let encoder = SparseVectorEncoder::in_memory();
        let err = encoder.encode_query(&texts(&["anything"])).unwrap_err();
        assert!(matches!(err, Error::VocabularyUnavailable));
    }

    #[test]
    fn empty_batch_cannot_be_fit() {
        let mut encoder = SparseVectorEncoder::in_memory();
        let err = encoder.fit_and_encode(&texts(&["", "a b"])).unwrap_err();
        assert!(matches!(err, Error::EmptyVocabulary));
        assert!(!encoder.is_fitted());
    }

    #[test]
    fn vocabulary_is_sorted_and_indices_ascend() {
        let mut encoder = SparseVectorEncoder::in_memory();
        let vectors = encoder
            .fit_and_encode(&texts(&["пример текст обработка", "пример один"]))
            .unwrap();

        assert_eq!(encoder.vocabulary_size(), 4);
        assert_eq!(encoder.term_index("обработка"), Some(0));
        assert_eq!(encoder.term_index("один"), Some(1));
        assert_eq!(encoder.term_index("пример"), Some(2));
        assert_eq!(encoder.term_index("текст"), Some(3));

        for v in &vectors {
            assert_eq!(v.indices.len(), v.weights.len());
            assert!(v.indices.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(vectors[0].indices, vec![0, 2, 3]);
        assert_eq!(vectors[1].indices, vec![1, 2]);
    }

    #[test]
    fn weights_match_smoothed_idf_and_are_normalized() {
        let mut encoder = SparseVectorEncoder::in_memory();
        let vectors = encoder
            .fit_and_encode(&texts(&["aa bb", "aa cc"]))
            .unwrap();

        // aa appears in both docs: idf = ln(3/3) + 1 = 1.
        // bb appears in one: idf = ln(3/2) + 1.
        let idf_bb = (1.5f32).ln() + 1.0;
        let norm = (1.0 + idf_bb * idf_bb).sqrt();

        let v = &vectors[0];
        assert_eq!(v.indices, vec![0, 1]);
        assert!((v.weights[0] - 1.0 / norm).abs() < 1e-6);
        assert!((v.weights[1] - idf_bb / norm).abs() < 1e-6);

        let length: f32 = v.weights.iter().map(|w| w * w).sum();
        assert!((length - 1.0).abs() < 1e-5);
    }

    #[test]
    fn query_shares_index_space_with_fit() {
        let mut encoder = SparseVectorEncoder::in_memory();
        let batch = texts(&["пример текст обработка", "еще один пример текст"]);
        let fitted = encoder.fit_and_encode(&batch).unwrap();
        let query = encoder.encode_query(&batch[..1]).unwrap();
        assert_eq!(query[0], fitted[0]);
    }

    #[test]
    fn unknown_query_terms_are_ignored() {
        let mut encoder = SparseVectorEncoder::in_memory();
        encoder.fit_and_encode(&texts(&["aa bb"])).unwrap();
        let query = encoder.encode_query(&texts(&["zz yy"])).unwrap();
        assert!(query[0].is_empty());
    }

    #[test]
    fn refit_replaces_vocabulary() {
        let mut encoder = SparseVectorEncoder::in_memory();
        encoder.fit_and_encode(&texts(&["aa bb"])).unwrap();
        encoder.fit_and_encode(&texts(&["cc dd"])).unwrap();
        assert_eq!(encoder.term_index("aa"), None);
        assert_eq!(encoder.term_index("cc"), Some(0));
    }

    #[test]
    fn cache_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache").join("vocabulary.json");
        let batch = texts(&["aa bb cc", "bb cc dd"]);

        let fitted = {
            let mut encoder = SparseVectorEncoder::open(&path).unwrap();
            assert!(!encoder.is_fitted());
            encoder.fit_and_encode(&batch).unwrap()
        };

        let reopened = SparseVectorEncoder::open(&path).unwrap();
        assert!(reopened.is_fitted());
        assert_eq!(reopened.encode_query(&batch).unwrap(), fitted);
    }

    #[test]
    fn corrupt_cache_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vocabulary.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = SparseVectorEncoder::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptCache { .. }));
    }

    #[test]
    fn newer_cache_version_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vocabulary.json");
        std::fs::write(
            &path,
            r#"{"format":"simple-rag/tfidf","version":99,"document_count":0,"terms":[]}"#,
        )
        .unwrap();

        let err = SparseVectorEncoder::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptCache { .. }));
    }

    #[test]
    fn unknown_cache_fields_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vocabulary.json");
        std::fs::write(
            &path,
            r#"{"format":"simple-rag/tfidf","version":1,"document_count":1,
                "terms":[{"term":"aa","idf":1.0,"df":1}],"fitted_at":"today"}"#,
        )
        .unwrap();

        let encoder = SparseVectorEncoder::open(&path).unwrap();
        assert_eq!(encoder.term_index("aa"), Some(0));
    }

    #[test]
    fn dot_product_over_shared_indices() {
        let a = SparseVector {
            indices: vec![0, 2, 5],
            weights: vec![1.0, 2.0, 3.0],
        };
        let b = SparseVector {
            indices: vec![2, 3, 5],
            weights: vec![0.5, 9.0, 1.0],
        };
        assert!((a.dot(&b) - 4.0).abs() < 1e-6);
    }
}
