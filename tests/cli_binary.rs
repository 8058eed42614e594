use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde_json::Value;

const SETTINGS: &str = r#"
[normalizer]
language = "english"
lemmatizer = "identity"

[vector_store]
backend = "local"

[embedder]
dimension = 32
"#;

fn simple_rag_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_simple-rag"))
}

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(data_dir.join("settings.toml"), SETTINGS)?;
    let datasets = data_dir.join("datasets");
    std::fs::create_dir_all(&datasets)?;
    std::fs::write(
        datasets.join("reviews.txt"),
        "name=Blue Cafe category=Cafe text=Great espresso\n\
         name=Red Bar category=Bar text=Cheap beer and loud music\n",
    )?;
    Ok(())
}

fn run(data_dir: &Path, args: &[&str]) -> Result<Output, Box<dyn std::error::Error>> {
    let output = Command::new(simple_rag_bin())
        .args(args)
        .env("SIMPLE_RAG_DATA_DIR", data_dir)
        .env("SIMPLE_RAG_LOG", "warn")
        .env_remove("QDRANT_HOST")
        .env_remove("QDRANT_PORT")
        .output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn index_query_and_status_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let first = run(tempdir.path(), &["index"])?;
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert!(stdout(&first).contains("created index: 1 documents, 2 chunks"));

    let second = run(tempdir.path(), &["index"])?;
    assert!(second.status.success());
    assert!(stdout(&second).contains("up to date"));

    let query = run(tempdir.path(), &["query", "cheap beer", "--json", "-k", "1"])?;
    assert!(query.status.success(), "{}", String::from_utf8_lossy(&query.stderr));
    let results: Value = serde_json::from_str(&stdout(&query))?;
    let results = results.as_array().expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["additional_metadata"]["name"], "Red Bar");

    let status = run(tempdir.path(), &["status", "--json"])?;
    assert!(status.status.success());
    let status: Value = serde_json::from_str(&stdout(&status))?;
    assert_eq!(status["tracked_documents"], 1);
    assert_eq!(status["collection_exists"], true);
    assert!(status["vocabulary_terms"].as_u64().unwrap_or(0) > 0);

    Ok(())
}

#[test]
fn process_prints_tokens() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output = run(tempdir.path(), &["process", "The coffee is GOOD!", "--json"])?;
    assert!(output.status.success());
    let body: Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(body["tokens"], serde_json::json!(["coffee", "good"]));
    Ok(())
}

#[test]
fn query_before_index_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output = run(tempdir.path(), &["query", "beer"])?;
    assert!(!output.status.success());
    Ok(())
}
