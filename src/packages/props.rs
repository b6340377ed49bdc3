// src/packages/props.rs

//! Package properties (`props.json`) shipped inside every binary package

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};

/// Declarative package properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageProps {
    pub pkgname: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_desc: Option<String>,
    /// Absolute paths the package marks as user-editable
    #[serde(default)]
    pub conf_files: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub preserve: bool,
}

impl PackageProps {
    /// Load properties from a JSON document on disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_slice(&content)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::ParseError(format!("Invalid package properties: {}", e)))
    }

    pub fn pkgver(&self) -> String {
        format!("{}-{}", self.pkgname, self.version)
    }

    /// True when the archive entry is one of the package's conf files
    pub fn is_conf_file(&self, entry_path: &str) -> bool {
        let normalized = normalize_entry_path(entry_path);
        self.conf_files.iter().any(|c| *c == normalized)
    }
}

/// Normalize an archive entry name to the absolute path used in manifests
///
/// `./etc/foo.conf` and `etc/foo.conf` both become `/etc/foo.conf`.
pub fn normalize_entry_path(entry_path: &str) -> String {
    let trimmed = entry_path.trim_start_matches("./").trim_start_matches('/');
    format!("/{}", trimmed)
}

/// True when a manifest or entry path climbs out of the root directory
pub fn escapes_root(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}
