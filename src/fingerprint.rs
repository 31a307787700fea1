// Content fingerprinting
//
// Computes the SHA-256 digest of an audio file's raw bytes. The hex digest is
// the key of the result cache, so byte-identical uploads share one entry.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Hashes the file at `path` without loading it into memory at once.
pub async fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hashes an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Derives a cache key that also distinguishes model and language.
pub fn scoped_key(fingerprint: &str, model: &str, language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(language.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn file_and_buffer_digests_agree() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // larger than one read chunk
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();

        let from_file = fingerprint_file(file.path()).await.unwrap();
        assert_eq!(from_file, fingerprint_bytes(&data));
        assert_eq!(from_file.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            fingerprint_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = fingerprint_file(&dir.path().join("absent.wav")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn scoped_keys_differ_by_language() {
        let fp = fingerprint_bytes(b"audio");
        assert_ne!(scoped_key(&fp, "base", "en"), scoped_key(&fp, "base", "fr"));
        assert_eq!(scoped_key(&fp, "base", "en"), scoped_key(&fp, "base", "en"));
    }
}
