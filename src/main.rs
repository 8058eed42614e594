use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use simple_rag::{
    DataDir,
    Error,
    Result,
    Settings,
    cli::{Cli, Command, IndexArgs, ProcessArgs, QueryArgs, ServeArgs},
    incremental::Manifest,
    pipeline::Pipeline,
    search::{QueryCoordinator, QueryResult},
    server::{self, AppState},
    sparse::SparseVectorEncoder,
    sync::{IndexSynchronizer, SyncOptions},
    walker,
};
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "SIMPLE_RAG_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let mut settings = Settings::resolve(&data_dir, cli.config.as_deref())?;

    match cli.command {
        Command::Index(args) => cmd_index(&data_dir, &mut settings, args),
        Command::Serve(args) => cmd_serve(&data_dir, &mut settings, args),
        Command::Process(args) => cmd_process(&data_dir, &settings, &args),
        Command::Query(args) => cmd_query(&data_dir, &mut settings, &args),
        Command::Status(args) => cmd_status(&data_dir, &settings, args.json),
        Command::Completions(_) => Ok(()),
    }
}

fn cmd_index(data_dir: &DataDir, settings: &mut Settings, args: IndexArgs) -> Result<()> {
    if args.prune {
        settings.index.prune_deleted = true;
    }
    let root = args.path.unwrap_or_else(|| data_dir.datasets_dir());
    let documents = walker::list_documents(&root, &settings.extensions())?;
    tracing::info!(root = %root.display(), documents = documents.len(), "scanned datasets");

    let normalizer = Arc::new(settings.build_normalizer(data_dir)?);
    let pipeline = Pipeline::reviews(settings.record_parser(), normalizer);
    let encoder = SparseVectorEncoder::open(&data_dir.vocabulary_file()?)?;

    let mut synchronizer = IndexSynchronizer::new(
        settings.build_store(data_dir)?,
        settings.build_embedder()?,
        encoder,
        pipeline,
        SyncOptions {
            collection: settings.vector_store.collection.clone(),
            batch_size: settings.vector_store.batch_size,
            hybrid: settings.vector_store.enable_hybrid,
            manifest_path: data_dir.manifest_file()?,
            prune_deleted: settings.index.prune_deleted,
        },
    );

    let outcome = synchronizer.synchronize(documents)?;
    println!("{outcome}");
    if outcome.is_success() {
        Ok(())
    } else {
        Err(Error::BackingStore(outcome.to_string()))
    }
}

fn cmd_serve(data_dir: &DataDir, settings: &mut Settings, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        settings.server.bind = bind;
    }
    let state = AppState::from_settings(settings, data_dir)?;
    server::run_server(state, &settings.server.bind)
}

fn cmd_process(data_dir: &DataDir, settings: &Settings, args: &ProcessArgs) -> Result<()> {
    let normalizer = settings.build_normalizer(data_dir)?;
    let tokens = normalizer.normalize(&args.text);
    if args.json {
        println!("{}", json!({ "tokens": tokens }));
    } else {
        println!("{}", tokens.join(" "));
    }
    Ok(())
}

fn cmd_query(data_dir: &DataDir, settings: &mut Settings, args: &QueryArgs) -> Result<()> {
    if let Some(mode) = args.mode {
        settings.query.mode = mode;
        settings.validate()?;
    }
    let dense_k = args.top_k.unwrap_or(settings.query.similarity_top_k);
    let sparse_k = args.sparse_k.unwrap_or(settings.query.sparse_top_k);

    let normalizer = Arc::new(settings.build_normalizer(data_dir)?);
    let coordinator = QueryCoordinator::from_settings(settings, data_dir, normalizer)?;
    let results = coordinator.query(&args.text, dense_k, sparse_k)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[QueryResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let meta = &r.additional_metadata;
        println!(
            "{:>2}. [{:.4}] {} ({}) in {}",
            i + 1,
            r.score,
            meta.name,
            meta.category,
            r.dataset
        );
        println!("    {}", r.text);
    }
}

fn cmd_status(data_dir: &DataDir, settings: &Settings, json: bool) -> Result<()> {
    let manifest = Manifest::load(&data_dir.manifest_file()?)?;
    let tracked = manifest.as_ref().map_or(0, Manifest::len);
    let encoder = SparseVectorEncoder::open(&data_dir.vocabulary_file()?)?;

    let collection = &settings.vector_store.collection;
    let exists = settings
        .build_store(data_dir)
        .and_then(|store| store.collection_exists(collection));
    let store_state = match &exists {
        Ok(true) => "present".to_string(),
        Ok(false) => "missing".to_string(),
        Err(e) => format!("unavailable ({e})"),
    };

    if json {
        let status = json!({
            "data_dir": data_dir.root().display().to_string(),
            "settings_file": data_dir.settings_file().exists(),
            "backend": settings.vector_store.backend,
            "collection": collection,
            "collection_exists": exists.as_ref().ok(),
            "query_mode": settings.query.mode,
            "tracked_documents": tracked,
            "vocabulary_terms": encoder.vocabulary_size(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Backend: {:?}", settings.vector_store.backend);
        println!("Collection: {collection} ({store_state})");
        println!("Query mode: {:?}", settings.query.mode);
        println!("Tracked documents: {tracked}");
        println!("Vocabulary terms: {}", encoder.vocabulary_size());
    }
    Ok(())
}
