// src/packages/manifest.rs

//! File manifests (`files.json`)
//!
//! A manifest lists every filesystem object a package version owns, split
//! into regular files, configuration files and symlinks. One is shipped in
//! each binary package and a copy is persisted in the package's metadata
//! directory after a successful unpack.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A regular or configuration file with its recorded hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file: String,
    pub sha256: String,
}

/// A symbolic link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Manifest section an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Files,
    ConfFiles,
    Links,
}

impl FileCategory {
    pub fn as_str(&self) -> &str {
        match self {
            FileCategory::Files => "files",
            FileCategory::ConfFiles => "conf_files",
            FileCategory::Links => "links",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub conf_files: Vec<FileEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

impl FileManifest {
    /// Decode a manifest from a reader (e.g. an archive entry)
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| Error::ParseError(format!("Invalid file manifest: {}", e)))
    }

    /// Load a persisted manifest, `None` if it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to open manifest {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        Self::from_reader(io::BufReader::new(file)).map(Some)
    }

    /// Persist the manifest, replacing any previous copy atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            Error::IoError(format!("Manifest path has no parent: {}", path.display()))
        })?;
        fs::create_dir_all(dir).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let mut temp = NamedTempFile::new_in(dir)?;
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::ParseError(format!("Failed to encode manifest: {}", e)))?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", path.display(), e.error))
        })?;

        debug!("Wrote file manifest {}", path.display());
        Ok(())
    }

    /// Recorded hash of `path` in the given section
    pub fn sha256_of(&self, category: FileCategory, path: &str) -> Option<&str> {
        let section = match category {
            FileCategory::Files => &self.files,
            FileCategory::ConfFiles => &self.conf_files,
            FileCategory::Links => return None,
        };
        section
            .iter()
            .find(|entry| entry.file == path)
            .map(|entry| entry.sha256.as_str())
    }

    /// Hash lookup table over the files and conf_files sections
    pub fn hash_index(&self) -> HashIndex {
        let table = |section: &[FileEntry]| {
            section
                .iter()
                .map(|entry| (entry.file.clone(), entry.sha256.clone()))
                .collect()
        };
        HashIndex {
            files: table(&self.files),
            conf_files: table(&self.conf_files),
        }
    }

    /// Every path in manifest order: files, conf_files, links
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(|e| e.file.as_str())
            .chain(self.conf_files.iter().map(|e| e.file.as_str()))
            .chain(self.links.iter().map(|e| e.file.as_str()))
    }

    /// Set of every path the manifest owns
    pub fn path_set(&self) -> HashSet<&str> {
        self.paths().collect()
    }

    /// Number of filesystem entries the manifest describes
    pub fn entry_count(&self) -> usize {
        self.files.len() + self.conf_files.len() + self.links.len()
    }
}

/// Recorded hashes keyed by path, built once per unpack
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    files: HashMap<String, String>,
    conf_files: HashMap<String, String>,
}

impl HashIndex {
    /// Same answer as [`FileManifest::sha256_of`] without scanning
    pub fn get(&self, category: FileCategory, path: &str) -> Option<&str> {
        let table = match category {
            FileCategory::Files => &self.files,
            FileCategory::ConfFiles => &self.conf_files,
            FileCategory::Links => return None,
        };
        table.get(path).map(String::as_str)
    }
}
