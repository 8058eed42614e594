use sha2::{Digest, Sha256};

/// A stable point identifier derived from (document identity, chunk ordinal).
///
/// Derived from SHA-256 rather than `std`'s hasher so the same chunk maps to
/// the same point across builds and processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkId {
    /// The numeric ID used as the point key in the vector store.
    pub numeric: u64,
}

impl ChunkId {
    pub fn new(ref_doc_id: &str, ordinal: usize) -> Self {
        Self {
            numeric: Self::hash_pair(ref_doc_id, ordinal),
        }
    }

    fn hash_pair(ref_doc_id: &str, ordinal: usize) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(ref_doc_id.as_bytes());
        hasher.update([0u8]);
        hasher.update((ordinal as u64).to_le_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ChunkId::new("datasets/reviews.txt", 0);
        let b = ChunkId::new("datasets/reviews.txt", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn ordinal_changes_id() {
        let a = ChunkId::new("datasets/reviews.txt", 0);
        let b = ChunkId::new("datasets/reviews.txt", 1);
        assert_ne!(a.numeric, b.numeric);
    }

    #[test]
    fn document_changes_id() {
        let a = ChunkId::new("a.txt", 0);
        let b = ChunkId::new("b.txt", 0);
        assert_ne!(a.numeric, b.numeric);
    }
}
