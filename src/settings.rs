use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    data_dir::DataDir,
    embedding::{Embedder, HashingEmbedder, HttpEmbedder},
    error::{Error, Result},
    normalize::{Lemmatizer, NormalizerLanguage, TextNormalizer},
    record::{RecordMarkers, ReviewRecordParser},
    store::{
        QueryMode,
        VectorStore,
        memory::MemoryStore,
        qdrant::QdrantStore,
    },
};

pub const QDRANT_HOST_ENV_VAR: &str = "QDRANT_HOST";
pub const QDRANT_PORT_ENV_VAR: &str = "QDRANT_PORT";
pub const BIND_ENV_VAR: &str = "SIMPLE_RAG_BIND";

const DEFAULT_QDRANT_HOST: &str = "localhost";
const DEFAULT_QDRANT_PORT: u16 = 6333;

/// Everything configurable about a deployment, read from `settings.toml`.
///
/// Every field has a default, so an absent file or an empty table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// File extensions (without the dot) picked up from the datasets
    /// directory.
    pub dataset_exts: Vec<String>,
    pub normalizer: NormalizerSettings,
    pub records: RecordMarkers,
    pub vector_store: VectorStoreSettings,
    pub query: QuerySettings,
    pub embedder: EmbedderSettings,
    pub index: IndexSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset_exts: vec!["txt".to_string()],
            normalizer: NormalizerSettings::default(),
            records: RecordMarkers::default(),
            vector_store: VectorStoreSettings::default(),
            query: QuerySettings::default(),
            embedder: EmbedderSettings::default(),
            index: IndexSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LemmatizerKind {
    Identity,
    #[default]
    Snowball,
    Lexicon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub language: NormalizerLanguage,
    pub lemmatizer: LemmatizerKind,
    /// TSV lexicon for the `lexicon` lemmatizer. Relative paths are resolved
    /// against the data directory.
    pub lexicon: Option<PathBuf>,
    pub extra_stopwords: Vec<String>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            language: NormalizerLanguage::Russian,
            lemmatizer: LemmatizerKind::default(),
            lexicon: None,
            extra_stopwords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    /// In-process store snapshotted to `store.json` in the data directory.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: StoreBackend,
    pub collection: String,
    pub batch_size: usize,
    pub enable_hybrid: bool,
    pub qdrant_url: String,
    pub timeout_secs: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            collection: "user_reviews".to_string(),
            batch_size: 20,
            enable_hybrid: true,
            qdrant_url: format!("http://{DEFAULT_QDRANT_HOST}:{DEFAULT_QDRANT_PORT}"),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub mode: QueryMode,
    pub similarity_top_k: usize,
    pub sparse_top_k: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            mode: QueryMode::default(),
            similarity_top_k: 3,
            sparse_top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Hashing,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub dimension: usize,
    /// Full URL of an OpenAI-compatible embeddings endpoint.
    pub url: String,
    pub model: String,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            dimension: 384,
            url: "http://localhost:8080/v1/embeddings".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Delete the points of documents that disappeared since the last run.
    pub prune_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `path`, falling back to defaults if the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&content)?)
    }

    /// Load the settings for `data_dir` (or from `explicit`), apply the
    /// process environment and validate the result.
    pub fn resolve(data_dir: &DataDir, explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.settings_file());
        let mut settings = Self::load(&path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override settings from environment variables.
    ///
    /// `QDRANT_HOST` and `QDRANT_PORT` replace the Qdrant URL (each falling
    /// back to its default when only the other is set); `SIMPLE_RAG_BIND`
    /// replaces the server bind address.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let host = lookup(QDRANT_HOST_ENV_VAR).filter(|h| !h.trim().is_empty());
        let port = lookup(QDRANT_PORT_ENV_VAR).filter(|p| !p.trim().is_empty());

        if host.is_some() || port.is_some() {
            let port = match port {
                Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                    Error::Config(format!("{QDRANT_PORT_ENV_VAR} is not a port number: {raw}"))
                })?,
                None => DEFAULT_QDRANT_PORT,
            };
            let host = host.unwrap_or_else(|| DEFAULT_QDRANT_HOST.to_string());
            self.vector_store.qdrant_url = format!("http://{}:{port}", host.trim());
        }

        if let Some(bind) = lookup(BIND_ENV_VAR).filter(|b| !b.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_store.batch_size == 0 {
            return Err(Error::Config("vector_store.batch_size must be positive".into()));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(Error::Config("vector_store.collection must not be empty".into()));
        }
        if self.embedder.dimension == 0 {
            return Err(Error::Config("embedder.dimension must be positive".into()));
        }
        if self.normalizer.lemmatizer == LemmatizerKind::Lexicon
            && self.normalizer.lexicon.is_none()
        {
            return Err(Error::Config(
                "normalizer.lemmatizer = \"lexicon\" needs normalizer.lexicon".into(),
            ));
        }
        if self.query.mode.uses_sparse() && !self.vector_store.enable_hybrid {
            return Err(Error::Config(format!(
                "query mode {:?} needs vector_store.enable_hybrid",
                self.query.mode
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.vector_store.timeout_secs)
    }

    /// Extensions normalized to lowercase without a leading dot.
    pub fn extensions(&self) -> Vec<String> {
        self.dataset_exts
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect()
    }

    pub fn record_parser(&self) -> ReviewRecordParser {
        ReviewRecordParser::new(self.records.clone())
    }

    pub fn build_normalizer(&self, data_dir: &DataDir) -> Result<TextNormalizer> {
        let cfg = &self.normalizer;
        let lemmatizer = match cfg.lemmatizer {
            LemmatizerKind::Identity => Lemmatizer::Identity,
            LemmatizerKind::Snowball => Lemmatizer::snowball(cfg.language),
            LemmatizerKind::Lexicon => {
                let path = cfg.lexicon.as_deref().ok_or_else(|| {
                    Error::Config("lexicon lemmatizer without a lexicon file".into())
                })?;
                Lemmatizer::load_lexicon(&data_dir.root().join(path))?
            }
        };
        Ok(TextNormalizer::new(cfg.language, lemmatizer, &cfg.extra_stopwords))
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let cfg = &self.embedder;
        Ok(match cfg.kind {
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(cfg.dimension)),
            EmbedderKind::Http => Arc::new(HttpEmbedder::new(
                cfg.url.clone(),
                cfg.model.clone(),
                cfg.dimension,
                self.timeout(),
            )?),
        })
    }

    pub fn build_store(&self, data_dir: &DataDir) -> Result<Arc<dyn VectorStore>> {
        Ok(match self.vector_store.backend {
            StoreBackend::Qdrant => {
                Arc::new(QdrantStore::new(&self.vector_store.qdrant_url, self.timeout())?)
            }
            StoreBackend::Local => Arc::new(MemoryStore::open(&data_dir.local_store_file())?),
        })
    }
}
