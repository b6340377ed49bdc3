// src/hash.rs

//! SHA-256 helpers for file integrity checks

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Compute the lowercase hex SHA-256 of a file on disk
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        Error::IoError(format!("Failed to open {} for hashing: {}", path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| {
        Error::IoError(format!("Failed to read {} for hashing: {}", path.display(), e))
    })?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the lowercase hex SHA-256 of an in-memory buffer
pub fn bytes_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_hash_matches_buffer_hash() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let on_disk = file_sha256(file.path()).unwrap();
        assert_eq!(on_disk, bytes_sha256(b"hello world"));
        assert_eq!(
            on_disk,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_missing_file() {
        let result = file_sha256(Path::new("/nonexistent/file"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
