// src/unpack/conf.rs

//! Configuration file reconciliation on update
//!
//! When an update ships a configuration file that already exists on disk,
//! three hashes decide what happens to it: the one recorded by the
//! installed version (original), the one of the file on disk (current) and
//! the one shipped by the new version (new).

use crate::error::Result;
use crate::hash::file_sha256;
use crate::packages::{FileCategory, FileManifest};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do with an existing configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfDecision {
    /// Overwrite the file on disk with the new one
    Replace,
    /// Leave the file on disk untouched, skip the archive entry
    KeepCurrent,
    /// Keep the file on disk and install the new one at `dest`
    Merge { dest: PathBuf },
}

/// Decides how an existing configuration file is reconciled
pub trait ConfPolicy {
    /// `path` is the normalized manifest path, `dest` the file on disk
    fn decide(
        &self,
        old: Option<&FileManifest>,
        new: &FileManifest,
        path: &str,
        dest: &Path,
        version: &str,
    ) -> Result<ConfDecision>;
}

/// Hash-based three-way policy
///
/// | current vs new | original vs current | original vs new | result      |
/// |----------------|---------------------|-----------------|-------------|
/// | equal          | -                   | -               | keep        |
/// | differ         | equal               | -               | replace     |
/// | differ         | differ              | equal           | keep        |
/// | differ         | differ              | differ          | merge       |
///
/// A file without a recorded original or new hash is merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfPolicy;

fn recorded_sha256<'a>(manifest: &'a FileManifest, path: &str) -> Option<&'a str> {
    manifest
        .sha256_of(FileCategory::ConfFiles, path)
        .or_else(|| manifest.sha256_of(FileCategory::Files, path))
}

/// `<dest>.new-<version>`
pub fn merge_path(dest: &Path, version: &str) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".new-{}", version));
    PathBuf::from(name)
}

impl ConfPolicy for DefaultConfPolicy {
    fn decide(
        &self,
        old: Option<&FileManifest>,
        new: &FileManifest,
        path: &str,
        dest: &Path,
        version: &str,
    ) -> Result<ConfDecision> {
        let current = file_sha256(dest)?;
        let orig = old.and_then(|m| recorded_sha256(m, path));
        let new_hash = recorded_sha256(new, path);

        let decision = match (orig, new_hash) {
            (_, Some(n)) if n == current => ConfDecision::KeepCurrent,
            (Some(o), Some(_)) if o == current => ConfDecision::Replace,
            (Some(o), Some(n)) if o == n => ConfDecision::KeepCurrent,
            _ => ConfDecision::Merge {
                dest: merge_path(dest, version),
            },
        };

        debug!("Configuration file {}: {:?}", path, decision);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::bytes_sha256;
    use crate::packages::FileEntry;
    use std::fs;
    use tempfile::tempdir;

    fn manifest_with(sha: &str) -> FileManifest {
        FileManifest {
            conf_files: vec![FileEntry {
                file: "/etc/foo.conf".to_string(),
                sha256: sha.to_string(),
            }],
            ..Default::default()
        }
    }

    fn decide(orig: &[u8], current: &[u8], new: &[u8]) -> ConfDecision {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("foo.conf");
        fs::write(&dest, current).unwrap();

        let old = manifest_with(&bytes_sha256(orig));
        let new = manifest_with(&bytes_sha256(new));
        DefaultConfPolicy
            .decide(Some(&old), &new, "/etc/foo.conf", &dest, "2.0_1")
            .unwrap()
    }

    #[test]
    fn test_unmodified_file_is_replaced() {
        assert_eq!(decide(b"a", b"a", b"b"), ConfDecision::Replace);
    }

    #[test]
    fn test_modified_file_kept_when_upstream_unchanged() {
        assert_eq!(decide(b"a", b"local", b"a"), ConfDecision::KeepCurrent);
    }

    #[test]
    fn test_identical_to_new_is_kept() {
        assert_eq!(decide(b"a", b"b", b"b"), ConfDecision::KeepCurrent);
    }

    #[test]
    fn test_all_differ_merges() {
        match decide(b"a", b"local", b"b") {
            ConfDecision::Merge { dest } => {
                assert!(dest.to_string_lossy().ends_with("foo.conf.new-2.0_1"));
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_no_original_hash_merges() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("foo.conf");
        fs::write(&dest, b"local").unwrap();

        let new = manifest_with(&bytes_sha256(b"b"));
        let decision = DefaultConfPolicy
            .decide(None, &new, "/etc/foo.conf", &dest, "2.0_1")
            .unwrap();
        assert!(matches!(decision, ConfDecision::Merge { .. }));
    }
}
