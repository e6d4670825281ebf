//! Manifest hashing helpers, grounded on
//! `dk-engine::workspace::overlay::FileOverlay`'s `Sha256::digest` usage —
//! the persistence layer there (Postgres) is replaced with plain file reads
//! per SPEC_FULL.md §6, but the hashing primitive is reused as-is.

use sha2::{Digest, Sha256};

pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub async fn hash_file(path: &std::path::Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(hash_bytes(&bytes))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// A file counts as binary if its first 512 bytes contain a NUL byte —
/// the same heuristic `git` itself uses for `diff`.
pub fn looks_binary(data: &[u8]) -> bool {
    data.iter().take(512).any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn looks_binary_detects_nul_byte() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"plain text"));
    }

    #[tokio::test]
    async fn hash_file_returns_none_for_missing_file() {
        let result = hash_file(std::path::Path::new("/nonexistent/path/to/file")).await.unwrap();
        assert!(result.is_none());
    }
}
