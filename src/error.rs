use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("settings error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("vector store error: {0}")]
    BackingStore(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("no TF-IDF vocabulary has been fit yet; run `simple-rag index` first")]
    VocabularyUnavailable,

    #[error("cannot fit TF-IDF vocabulary: no terms in the batch")]
    EmptyVocabulary,

    #[error("corrupt cache file {path} ({reason}); delete it and re-run indexing")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
