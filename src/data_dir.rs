use std::{
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "SIMPLE_RAG_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The SIMPLE_RAG_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/simple-rag/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("simple-rag")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.toml")
    }

    /// Default location of the source documents.
    pub fn datasets_dir(&self) -> PathBuf {
        self.root.join("datasets")
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("cache");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }

    pub fn manifest_file(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("manifest.json"))
    }

    pub fn vocabulary_file(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("vocabulary.json"))
    }

    /// Snapshot file of the local vector store backend.
    pub fn local_store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }
}

/// Write `bytes` to a uniquely named sibling temp file and rename it over
/// `path`. Concurrent writers never share a temp file; the last rename wins.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.settings_file(), tmp.path().join("settings.toml"));
        assert_eq!(dir.datasets_dir(), tmp.path().join("datasets"));
        assert_eq!(dir.local_store_file(), tmp.path().join("store.json"));
    }

    #[test]
    fn cache_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let manifest = dir.manifest_file().unwrap();

        assert!(tmp.path().join("cache").is_dir());
        assert_eq!(manifest, tmp.path().join("cache").join("manifest.json"));
        assert_eq!(
            dir.vocabulary_file().unwrap(),
            tmp.path().join("cache").join("vocabulary.json")
        );
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("file.json")]);
    }

    #[test]
    fn concurrent_writers_do_not_clobber_each_other() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");

        std::thread::scope(|scope| {
            for i in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    let body = format!("writer-{i}-").repeat(4096);
                    for _ in 0..20 {
                        write_atomic(path, body.as_bytes()).unwrap();
                    }
                });
            }
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let first = content.split('-').take(2).collect::<Vec<_>>().join("-");
        assert_eq!(content, format!("{first}-").repeat(4096));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
