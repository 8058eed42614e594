use std::{path::Path, sync::Arc};

use simple_rag::{
    Document,
    IndexSynchronizer,
    QueryCoordinator,
    SparseVectorEncoder,
    SyncOutcome,
    TextNormalizer,
    VectorStore,
    embedding::{Embedder, HashingEmbedder},
    incremental::Manifest,
    normalize::{Lemmatizer, NormalizerLanguage},
    pipeline::Pipeline,
    record::ReviewRecordParser,
    store::{QueryMode, memory::MemoryStore},
    sync::SyncOptions,
    walker,
};

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    normalizer: Arc<TextNormalizer>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("datasets")).unwrap();
        Self {
            dir,
            store: Arc::new(MemoryStore::new()),
            embedder: Arc::new(HashingEmbedder::new(32)),
            normalizer: Arc::new(TextNormalizer::new(
                NormalizerLanguage::English,
                Lemmatizer::Identity,
                &[],
            )),
        }
    }

    fn datasets(&self) -> std::path::PathBuf {
        self.dir.path().join("datasets")
    }

    fn manifest(&self) -> std::path::PathBuf {
        self.dir.path().join("manifest.json")
    }

    fn vocabulary(&self) -> std::path::PathBuf {
        self.dir.path().join("vocabulary.json")
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.datasets().join(name), content).unwrap();
    }

    fn scan(&self) -> Vec<Document> {
        walker::list_documents(&self.datasets(), &["txt".to_string()]).unwrap()
    }

    /// A fresh synchronizer per pass, the way separate `index` runs behave.
    fn synchronize(&self) -> SyncOutcome {
        let mut synchronizer = IndexSynchronizer::new(
            self.store.clone(),
            self.embedder.clone(),
            SparseVectorEncoder::open(&self.vocabulary()).unwrap(),
            Pipeline::reviews(ReviewRecordParser::default(), self.normalizer.clone()),
            SyncOptions {
                collection: "user_reviews".into(),
                batch_size: 20,
                hybrid: true,
                manifest_path: self.manifest(),
                prune_deleted: false,
            },
        );
        synchronizer.synchronize(self.scan()).unwrap()
    }

    fn manifest_len(&self) -> usize {
        Manifest::load(&self.manifest()).unwrap().map_or(0, |m| m.len())
    }

    fn coordinator(&self, mode: QueryMode) -> QueryCoordinator {
        QueryCoordinator::new(
            self.normalizer.clone(),
            Arc::new(SparseVectorEncoder::open(&self.vocabulary()).unwrap()),
            self.embedder.clone(),
            self.store.clone(),
            "user_reviews",
            mode,
        )
    }
}

fn touch_later(path: &Path, content: &str) {
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(path, content).unwrap();
}

#[test]
fn build_then_refresh_only_the_changed_document() {
    let fx = Fixture::new();
    fx.write("a.txt", "name=Blue Cafe category=Cafe text=Great coffee");
    fx.write("b.txt", "name=Closed Shop category=Shop text=");
    fx.write("c.txt", "name=Tea House category=Cafe text=Calm tea room");

    assert_eq!(fx.synchronize(), SyncOutcome::Created {
        documents: 3,
        chunks: 2
    });
    assert_eq!(fx.store.point_count("user_reviews").unwrap(), 2);
    assert_eq!(fx.manifest_len(), 3);

    touch_later(
        &fx.datasets().join("c.txt"),
        "name=Tea House category=Cafe text=Noisy tea room now",
    );
    assert_eq!(fx.synchronize(), SyncOutcome::Refreshed {
        documents: 1,
        chunks: 1,
        pruned: 0
    });
    assert_eq!(fx.store.point_count("user_reviews").unwrap(), 2);
    assert_eq!(fx.manifest_len(), 3);

    assert_eq!(fx.synchronize(), SyncOutcome::Unchanged);
}

#[test]
fn refreshed_text_replaces_old_text_in_results() {
    let fx = Fixture::new();
    fx.write("a.txt", "name=Blue Cafe category=Cafe text=Great coffee");
    fx.write("c.txt", "name=Tea House category=Cafe text=Calm tea room");
    fx.synchronize();

    touch_later(
        &fx.datasets().join("c.txt"),
        "name=Tea House category=Cafe text=Noisy tea room",
    );
    fx.synchronize();

    let results = fx
        .coordinator(QueryMode::Dense)
        .query("noisy tea room", 5, 5)
        .unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert!(texts.contains(&"Noisy tea room"));
    assert!(!texts.contains(&"Calm tea room"));
}

#[test]
fn vocabulary_survives_reopen_and_serves_queries() {
    let fx = Fixture::new();
    fx.write(
        "reviews.txt",
        "name=Blue Cafe category=Cafe text=Great espresso\n\
         name=Red Bar category=Bar text=Cheap beer\n",
    );
    fx.synchronize();

    let reopened = SparseVectorEncoder::open(&fx.vocabulary()).unwrap();
    assert!(reopened.is_fitted());
    assert!(reopened.term_index("espresso").is_some());

    let results = fx
        .coordinator(QueryMode::Sparse)
        .query("cheap beer please", 3, 3)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].additional_metadata.name, "Red Bar");
    assert_eq!(results[0].dataset, "reviews.txt");
}

#[test]
fn empty_datasets_directory_is_a_no_op() {
    let fx = Fixture::new();
    assert_eq!(fx.synchronize(), SyncOutcome::NoDocuments);
    assert!(!fx.store.collection_exists("user_reviews").unwrap());
    assert!(!fx.manifest().exists());
    assert!(!fx.vocabulary().exists());
}
