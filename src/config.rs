// src/config.rs

//! Run configuration
//!
//! A `Config` is built once per run (from defaults, an optional TOML file
//! and command line overrides) and passed by reference to every component.
//! Nothing mutates it afterwards.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default root-relative prefix holding package metadata and the pkgdb
pub const DEFAULT_METADIR: &str = "var/db/pkgcore";

/// Default configuration file location
pub const DEFAULT_CONFFILE: &str = "/etc/pkgcore.toml";

/// Name of the pkgdb database under the metadata prefix
const PKGDB_FILE: &str = "pkgdb.sqlite";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory packages are unpacked into
    pub rootdir: PathBuf,
    /// Metadata prefix, relative to `rootdir`
    pub metadir: PathBuf,
    /// Configuration file handed to package scripts
    pub conffile: Option<PathBuf>,
    /// Extract with ownership and extended attributes
    pub privileged: bool,
    /// Preferred provider for a virtual package name
    pub virtual_packages: BTreeMap<String, String>,
    /// Explicit pkgdb location; defaults to `<root>/<metadir>/pkgdb.sqlite`
    pub db_path: Option<PathBuf>,
}

/// On-disk representation of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    rootdir: Option<PathBuf>,
    metadir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    virtual_packages: BTreeMap<String, String>,
}

impl Config {
    /// Create a configuration rooted at `rootdir` with default settings
    pub fn new(rootdir: impl Into<PathBuf>) -> Self {
        Self {
            rootdir: rootdir.into(),
            metadir: PathBuf::from(DEFAULT_METADIR),
            conffile: None,
            privileged: nix::unistd::geteuid().is_root(),
            virtual_packages: BTreeMap::new(),
            db_path: None,
        }
    }

    /// Load a TOML configuration file
    ///
    /// Keys missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = toml::from_str(&content)
            .map_err(|e| Error::ParseError(format!("Invalid config {}: {}", path.display(), e)))?;

        let mut config = Config::new(file.rootdir.unwrap_or_else(|| PathBuf::from("/")));
        if let Some(metadir) = file.metadir {
            config.metadir = metadir;
        }
        config.db_path = file.db_path;
        config.virtual_packages = file.virtual_packages;
        config.conffile = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn with_rootdir(mut self, rootdir: impl Into<PathBuf>) -> Self {
        self.rootdir = rootdir.into();
        self
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(db_path.into());
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_virtual_package(mut self, virtual_name: &str, provider: &str) -> Self {
        self.virtual_packages
            .insert(virtual_name.to_string(), provider.to_string());
        self
    }

    /// Absolute metadata prefix (`<root>/<metadir>`)
    pub fn meta_path(&self) -> PathBuf {
        self.rootdir.join(&self.metadir)
    }

    /// Per-package metadata directory (`<root>/<metadir>/metadata/<pkgname>`)
    pub fn metadata_dir(&self, pkgname: &str) -> PathBuf {
        self.meta_path().join("metadata").join(pkgname)
    }

    /// Location of the package state database
    pub fn pkgdb_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.meta_path().join(PKGDB_FILE))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_paths() {
        let config = Config::new("/mnt/target");
        assert_eq!(config.meta_path(), PathBuf::from("/mnt/target/var/db/pkgcore"));
        assert_eq!(
            config.metadata_dir("foo"),
            PathBuf::from("/mnt/target/var/db/pkgcore/metadata/foo")
        );
        assert_eq!(
            config.pkgdb_path(),
            PathBuf::from("/mnt/target/var/db/pkgcore/pkgdb.sqlite")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
rootdir = "/srv/root"
metadir = "var/lib/pkgs"

[virtual_packages]
editor = "vim"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rootdir, PathBuf::from("/srv/root"));
        assert_eq!(config.metadir, PathBuf::from("var/lib/pkgs"));
        assert_eq!(config.virtual_packages.get("editor").unwrap(), "vim");
        assert_eq!(config.conffile.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bogus = 1").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
}
