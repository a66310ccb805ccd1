use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of a file, read in chunks.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Checksums are compared byte-exact against lowercase hex; an uppercase catalog value never matches.
pub fn checksum_matches(computed: &str, expected: &str) -> bool {
    computed == expected
}

/// `true` when the file exists and hashes to `expected`. Read errors count as a mismatch.
pub async fn verify_file(path: &Path, expected: &str) -> bool {
    match sha256_file(path).await {
        Ok(computed) => {
            let ok = checksum_matches(&computed, expected);
            if !ok {
                log::info!(
                    "Checksum mismatch for {:?} ({} != {})",
                    path,
                    computed,
                    expected
                );
            }
            ok
        }
        Err(e) => {
            log::debug!("Cannot hash {:?}: {}", path, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_sha256() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let hash = sha256_file(file.path()).await.unwrap();
        assert_eq!(hash, HELLO_SHA256);
    }

    #[tokio::test]
    async fn verify_is_case_sensitive() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        assert!(verify_file(file.path(), HELLO_SHA256).await);
        assert!(!verify_file(file.path(), &HELLO_SHA256.to_uppercase()).await);
    }

    #[tokio::test]
    async fn missing_file_does_not_verify() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!verify_file(&dir.path().join("nope.zip"), HELLO_SHA256).await);
    }
}
