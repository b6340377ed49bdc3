// src/repository/index.rs

//! In-memory index of one repository

use crate::error::{Error, Result};
use crate::packages::PackageRecord;
use crate::repository::RepositoryMetadata;
use crate::version::{cmpver, pkg_name, pkgpattern_match, pkgpattern_name};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Packages published by one repository, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct RepositoryIndex {
    /// Location the binary packages are fetched from
    pub location: String,
    packages: BTreeMap<String, PackageRecord>,
}

/// Reject patterns the glob matcher cannot compile
fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.contains(['*', '?', '[']) && !pattern.contains(['<', '>']) {
        glob::Pattern::new(pattern).map_err(|e| {
            Error::ParseError(format!("Invalid package pattern '{}': {}", pattern, e))
        })?;
    }
    Ok(())
}

impl RepositoryIndex {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            packages: BTreeMap::new(),
        }
    }

    /// Build an index from a decoded `index.json`
    ///
    /// When a package name appears more than once the newest version wins.
    pub fn from_metadata(location: impl Into<String>, metadata: RepositoryMetadata) -> Self {
        let mut index = Self::new(location);
        for record in metadata.packages {
            index.insert(record);
        }
        index
    }

    pub fn insert(&mut self, record: PackageRecord) {
        if let Some(existing) = self.packages.get(&record.pkgname)
            && cmpver(&existing.pkgver, &record.pkgver) != Ordering::Less
        {
            debug!(
                "{}: ignoring {} (have {})",
                self.location, record.pkgver, existing.pkgver
            );
            return;
        }
        self.packages.insert(record.pkgname.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.values()
    }

    /// Concrete package named `pkgname`
    pub fn find_by_name(&self, pkgname: &str) -> Option<&PackageRecord> {
        self.packages.get(pkgname)
    }

    /// Concrete package matching `pattern`
    pub fn find_by_pattern(&self, pattern: &str) -> Result<Option<&PackageRecord>> {
        validate_pattern(pattern)?;

        if let Some(name) = pkgpattern_name(pattern)
            && let Some(record) = self.packages.get(name)
            && pkgpattern_match(&record.pkgver, pattern)
        {
            return Ok(Some(record));
        }
        Ok(self
            .packages
            .values()
            .find(|record| pkgpattern_match(&record.pkgver, pattern)))
    }

    /// Concrete package with exactly this `pkgver`
    pub fn find_by_pkgver(&self, pkgver: &str) -> Option<&PackageRecord> {
        let name = pkg_name(pkgver)?;
        self.packages
            .get(name)
            .filter(|record| record.pkgver == pkgver)
    }

    /// Package providing virtual `name`
    ///
    /// `preferred` is the user's configured provider; it is honored when
    /// this repository has it and it really provides `name`.
    pub fn find_virtual_by_name(&self, name: &str, preferred: Option<&str>) -> Option<&PackageRecord> {
        if let Some(provider) = preferred
            && let Some(record) = self.packages.get(provider)
            && record.provides_name(name)
        {
            return Some(record);
        }
        self.packages
            .values()
            .find(|record| record.provides_name(name))
    }

    /// Package providing a virtual pkgver that matches `pattern`
    pub fn find_virtual_by_pattern(
        &self,
        pattern: &str,
        preferred: Option<&str>,
    ) -> Result<Option<&PackageRecord>> {
        validate_pattern(pattern)?;

        if let Some(provider) = preferred
            && let Some(record) = self.packages.get(provider)
            && record.provides_pattern(pattern)
        {
            return Ok(Some(record));
        }
        Ok(self
            .packages
            .values()
            .find(|record| record.provides_pattern(pattern)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version, &format!("{}-{}.pkg", name, version))
    }

    fn sample_index() -> RepositoryIndex {
        let mut nano = record("nano", "2.2_1");
        nano.provides = vec!["editor".to_string(), "text-editor-1.0_1".to_string()];
        let mut vim = record("vim", "7.3_1");
        vim.provides = vec!["editor".to_string()];

        let metadata = RepositoryMetadata {
            name: None,
            packages: vec![record("foo", "1.0_1"), record("foo", "1.2_1"), nano, vim],
        };
        RepositoryIndex::from_metadata("/srv/repo", metadata)
    }

    #[test]
    fn test_newest_duplicate_wins() {
        let index = sample_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.find_by_name("foo").unwrap().version, "1.2_1");
    }

    #[test]
    fn test_lookup_by_pattern_and_pkgver() {
        let index = sample_index();
        assert_eq!(
            index.find_by_pattern("foo>=1.1").unwrap().unwrap().pkgver,
            "foo-1.2_1"
        );
        assert!(index.find_by_pattern("foo<1.0").unwrap().is_none());
        assert_eq!(
            index.find_by_pattern("vi*").unwrap().unwrap().pkgname,
            "vim"
        );
        assert!(index.find_by_pkgver("foo-1.2_1").is_some());
        assert!(index.find_by_pkgver("foo-1.0_1").is_none());
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let index = sample_index();
        assert!(matches!(
            index.find_by_pattern("foo-[1"),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_virtual_lookup_honors_preference() {
        let index = sample_index();
        assert_eq!(
            index.find_virtual_by_name("editor", None).unwrap().pkgname,
            "nano"
        );
        assert_eq!(
            index.find_virtual_by_name("editor", Some("vim")).unwrap().pkgname,
            "vim"
        );
        // A preferred package that does not provide the name is ignored
        assert_eq!(
            index.find_virtual_by_name("editor", Some("foo")).unwrap().pkgname,
            "nano"
        );
        assert_eq!(
            index
                .find_virtual_by_pattern("text-editor>=1.0", None)
                .unwrap()
                .unwrap()
                .pkgname,
            "nano"
        );
    }
}
