//! Change detection between a document scan and the last manifest.
//!
//! A document's fingerprint is its modification time plus the SHA-256 of its
//! full content. The manifest maps document identity to the fingerprint seen
//! by the last scan and is rewritten wholesale on every scan.

use std::{
    collections::{BTreeMap, HashSet},
    io::Read,
    path::Path,
    time::SystemTime,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    data_dir::write_atomic,
    document::Document,
    error::{Error, Result},
};

const MANIFEST_VERSION: u32 = 1;

/// Change-detection signature of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    #[serde(skip)]
    pub identity: String,
    /// Modification time as fractional seconds since the Unix epoch.
    pub mtime: f64,
    /// Lowercase hex SHA-256 of the full file content.
    pub hash: String,
}

/// Fingerprint the file at `identity`.
///
/// Returns [`Error::NotFound`] if the file does not exist.
pub fn fingerprint(identity: &str) -> Result<DocumentFingerprint> {
    let path = Path::new(identity);
    let not_found = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                kind: "document",
                name: identity.to_string(),
            }
        } else {
            Error::Io(e)
        }
    };

    let mut file = std::fs::File::open(path).map_err(not_found)?;
    let mtime = file
        .metadata()
        .map_err(not_found)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(DocumentFingerprint {
        identity: identity.to_string(),
        mtime,
        hash: hex(&hasher.finalize()),
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// True unless `previous` exists and both mtime and hash match exactly.
pub fn has_changed(
    current: &DocumentFingerprint,
    previous: Option<&DocumentFingerprint>,
) -> bool {
    match previous {
        None => true,
        Some(prev) => current.mtime != prev.mtime || current.hash != prev.hash,
    }
}

/// Identity → fingerprint snapshot of the last full scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, DocumentFingerprint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    documents: BTreeMap<String, DocumentFingerprint>,
}

impl Manifest {
    /// Fingerprint every document. Fails on the first missing file.
    pub fn build(documents: &[Document]) -> Result<Self> {
        let fingerprints: Vec<DocumentFingerprint> = documents
            .par_iter()
            .map(|doc| fingerprint(&doc.id))
            .collect::<Result<_>>()?;
        Ok(Self::from_fingerprints(fingerprints))
    }

    pub fn from_fingerprints(
        fingerprints: impl IntoIterator<Item = DocumentFingerprint>,
    ) -> Self {
        Self {
            entries: fingerprints
                .into_iter()
                .map(|fp| (fp.identity.clone(), fp))
                .collect(),
        }
    }

    /// Load the manifest at `path`; `None` if there is none yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| Error::CorruptCache {
            path: path.to_path_buf(),
            reason,
        };
        let file: ManifestFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.version > MANIFEST_VERSION {
            return Err(corrupt(format!(
                "unsupported version {} (newest known is {MANIFEST_VERSION})",
                file.version
            )));
        }

        let entries = file
            .documents
            .into_iter()
            .map(|(identity, mut fp)| {
                fp.identity = identity.clone();
                (identity, fp)
            })
            .collect();
        Ok(Some(Self { entries }))
    }

    /// Overwrite the manifest file with this snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = ManifestFile {
            version: MANIFEST_VERSION,
            documents: self.entries.clone(),
        };
        write_atomic(path, &serde_json::to_vec_pretty(&file)?)
    }

    pub fn get(&self, identity: &str) -> Option<&DocumentFingerprint> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Identities recorded here that are missing from `documents`.
    pub fn vanished(&self, documents: &[Document]) -> Vec<String> {
        let seen: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        self.identities()
            .filter(|id| !seen.contains(id))
            .map(str::to_string)
            .collect()
    }
}

/// Keep the documents that are new or changed since the manifest at
/// `manifest_path` was written.
///
/// Without a manifest every document is kept. In every case the manifest is
/// then rewritten, once, from the full `documents` set rather than only the
/// documents that survived the filter.
pub fn filter_new_or_changed(
    documents: Vec<Document>,
    manifest_path: &Path,
) -> Result<Vec<Document>> {
    let previous = Manifest::load(manifest_path)?;
    let current = Manifest::build(&documents)?;

    let kept: Vec<Document> = match &previous {
        None => {
            tracing::debug!(
                path = %manifest_path.display(),
                "no manifest yet, treating every document as new"
            );
            documents
        }
        Some(previous) => documents
            .into_iter()
            .filter(|doc| {
                let Some(prev) = previous.get(&doc.id) else {
                    tracing::debug!(document = %doc.id, "new document");
                    return true;
                };
                let changed = current
                    .get(&doc.id)
                    .is_none_or(|cur| has_changed(cur, Some(prev)));
                if changed {
                    tracing::debug!(document = %doc.id, "changed document");
                }
                changed
            })
            .collect(),
    };

    current.save(manifest_path)?;
    tracing::info!(
        scanned = current.len(),
        kept = kept.len(),
        "compared documents against manifest"
    );

    Ok(kept)
}
