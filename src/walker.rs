use std::path::{Path, PathBuf};

use crate::{
    document::Document,
    error::{Error, Result},
};

/// Recursively collect dataset files under `root` whose extension is in
/// `extensions` (lowercase, no leading dot).
///
/// Hidden files and directories are skipped, symlinked directories are not
/// followed, and the result is sorted so identities come out in a stable
/// order.
pub fn discover_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let canonical_root = root.canonicalize().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                kind: "datasets directory",
                name: root.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    let mut results = Vec::new();
    walk_dir(&canonical_root, extensions, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(current: &Path, extensions: &[String], results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(&path, extensions, results)?;
        } else if file_type.is_symlink() {
            // Broken links and links to directories are skipped.
            if path.is_file() && has_extension(&path, extensions) {
                results.push(path);
            }
        } else if file_type.is_file() && has_extension(&path, extensions) {
            results.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Load every dataset file under `root` as a [`Document`].
///
/// Invalid UTF-8 is replaced rather than rejected so one bad byte does not
/// stop a whole indexing pass.
pub fn list_documents(root: &Path, extensions: &[String]) -> Result<Vec<Document>> {
    let files = discover_files(root, extensions)?;
    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let bytes = std::fs::read(&path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), "dataset file is not valid UTF-8");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        documents.push(Document::from_file(&path, text));
    }

    tracing::debug!(root = %root.display(), documents = documents.len(), "listed documents");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::keys;

    fn txt() -> Vec<String> {
        vec!["txt".to_string()]
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        let root = root.canonicalize().unwrap();
        files
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("reviews.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "x").unwrap();
        std::fs::write(tmp.path().join("upper.TXT"), "x").unwrap();

        let files = discover_files(tmp.path(), &txt()).unwrap();
        assert_eq!(names(&files, tmp.path()), vec!["reviews.txt", "upper.TXT"]);
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".draft.txt"), "x").unwrap();
        let hidden = tmp.path().join(".cache");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("old.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("live.txt"), "x").unwrap();

        let files = discover_files(tmp.path(), &txt()).unwrap();
        assert_eq!(names(&files, tmp.path()), vec!["live.txt"]);
    }

    #[test]
    fn recurses_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("2024");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("z.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();

        let files = discover_files(tmp.path(), &txt()).unwrap();
        assert_eq!(names(&files, tmp.path()), vec!["2024/b.txt", "a.txt", "z.txt"]);
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_files(&tmp.path().join("absent"), &txt()).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "datasets directory", .. }));
    }

    #[test]
    fn documents_carry_path_identity_and_text() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("reviews.txt"), "name=A text=B").unwrap();

        let docs = list_documents(tmp.path(), &txt()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "name=A text=B");
        assert_eq!(docs[0].metadata[keys::FILE_NAME], "reviews.txt");
        assert!(docs[0].path().is_absolute());
        assert!(docs[0].path().exists());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.txt"), [b'o', b'k', 0xff]).unwrap();

        let docs = list_documents(tmp.path(), &txt()).unwrap();
        assert!(docs[0].text.starts_with("ok"));
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_documents(tmp.path(), &txt()).unwrap().is_empty());
    }
}
