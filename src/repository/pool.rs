// src/repository/pool.rs

//! Repository pool resolution
//!
//! The pool is the ordered list of repositories a query is resolved
//! against. Pool order is a precedence policy: first-match searches stop
//! at the first repository that answers. Best-version searches scan every
//! repository and ignore the order.

use crate::config::Config;
use crate::db::models::Repository;
use crate::error::Result;
use crate::packages::PackageRecord;
use crate::packages::archive::read_member;
use crate::repository::index::RepositoryIndex;
use crate::repository::{load_index, path_from_repository_uri};
use crate::version::{Dewey, VersionComparator};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Package of the best-version scan so far
#[derive(Debug)]
struct BestMatch<'a> {
    pkgver: &'a str,
    location: &'a str,
}

pub struct RepositoryPool {
    repos: Vec<RepositoryIndex>,
    virtual_packages: BTreeMap<String, String>,
    comparator: Box<dyn VersionComparator>,
}

/// Copy of a record tagged with the repository it was found in
fn resolved(record: &PackageRecord, location: &str) -> PackageRecord {
    let mut record = record.clone();
    record.repository = Some(location.to_string());
    record
}

impl RepositoryPool {
    /// Create a pool over `repos`, highest precedence first
    pub fn new(config: &Config, repos: Vec<RepositoryIndex>) -> Self {
        Self {
            repos,
            virtual_packages: config.virtual_packages.clone(),
            comparator: Box::new(Dewey),
        }
    }

    /// Replace the version comparator used by best-version searches
    pub fn with_comparator(mut self, comparator: Box<dyn VersionComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Load every enabled repository registered in the pkgdb
    ///
    /// Repositories whose index cannot be read are left out of the pool.
    pub fn from_db(config: &Config, conn: &Connection) -> Result<Self> {
        let mut repos = Vec::new();
        for repo in Repository::list_enabled(conn)? {
            match load_index(Path::new(&repo.location)) {
                Ok(index) => {
                    debug!(
                        "Repository {} ({}): {} packages",
                        repo.name,
                        repo.location,
                        index.len()
                    );
                    repos.push(index);
                }
                Err(e) => warn!("Skipping repository {}: {}", repo.name, e),
            }
        }
        Ok(Self::new(config, repos))
    }

    pub fn repositories(&self) -> &[RepositoryIndex] {
        &self.repos
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Find a package by name or pattern
    ///
    /// Without `best` the first repository holding a concrete match, or a
    /// package providing `query` as a virtual package, answers. With `best`
    /// every repository is scanned for the newest concrete match.
    pub fn find_pkg(&self, query: &str, by_pattern: bool, best: bool) -> Result<Option<PackageRecord>> {
        if best {
            return self.find_best(query, by_pattern);
        }

        for repo in &self.repos {
            let found = if by_pattern {
                match repo.find_by_pattern(query)? {
                    Some(record) => Some(record),
                    None => repo.find_virtual_by_pattern(query, None)?,
                }
            } else {
                repo.find_by_name(query)
                    .or_else(|| repo.find_virtual_by_name(query, None))
            };

            if let Some(record) = found {
                debug!("{}: found {} in {}", query, record.pkgver, repo.location);
                return Ok(Some(resolved(record, &repo.location)));
            }
            debug!("{}: not found in {}", query, repo.location);
        }
        Ok(None)
    }

    /// Find a package among virtual package providers only
    ///
    /// The user's configured provider for the virtual name is preferred
    /// within each repository.
    pub fn find_virtualpkg(&self, query: &str, by_pattern: bool) -> Result<Option<PackageRecord>> {
        let virtual_name = if by_pattern {
            crate::version::pkgpattern_name(query).unwrap_or(query)
        } else {
            query
        };
        let preferred = self.virtual_packages.get(virtual_name).map(String::as_str);

        for repo in &self.repos {
            let found = if by_pattern {
                repo.find_virtual_by_pattern(query, preferred)?
            } else {
                repo.find_virtual_by_name(query, preferred)
            };

            if let Some(record) = found {
                debug!(
                    "{}: provided by {} in {}",
                    query, record.pkgver, repo.location
                );
                return Ok(Some(resolved(record, &repo.location)));
            }
        }
        Ok(None)
    }

    /// Find a package by exact pkgver
    ///
    /// When `location` is given only that repository is consulted.
    pub fn find_pkg_exact(&self, pkgver: &str, location: Option<&str>) -> Result<Option<PackageRecord>> {
        let found = self
            .repos
            .iter()
            .filter(|repo| location.is_none_or(|loc| repo.location == loc))
            .find_map(|repo| {
                repo.find_by_pkgver(pkgver)
                    .map(|record| resolved(record, &repo.location))
            });
        Ok(found)
    }

    fn find_best(&self, query: &str, by_pattern: bool) -> Result<Option<PackageRecord>> {
        let mut best: Option<BestMatch<'_>> = None;

        for repo in &self.repos {
            // A lookup error other than "not found" aborts the whole scan
            let candidate = if by_pattern {
                repo.find_by_pattern(query)?
            } else {
                repo.find_by_name(query)
            };
            let Some(candidate) = candidate else {
                debug!("{}: not found in {}", query, repo.location);
                continue;
            };

            let newer = match &best {
                None => true,
                Some(current) => self.comparator.is_newer(&candidate.pkgver, current.pkgver),
            };
            if newer {
                debug!(
                    "{}: best match so far {} in {}",
                    query, candidate.pkgver, repo.location
                );
                best = Some(BestMatch {
                    pkgver: &candidate.pkgver,
                    location: &repo.location,
                });
            }
        }

        match best {
            Some(best) => self.find_pkg_exact(best.pkgver, Some(best.location)),
            None => Ok(None),
        }
    }

    /// Read a metadata member (e.g. `props.json`) of a package's binary
    /// archive without unpacking it
    pub fn package_metadata(&self, pkgname: &str, member: &str) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.find_pkg(pkgname, false, false)? else {
            return Ok(None);
        };
        let path = path_from_repository_uri(&record)?;
        read_member(&path, member)
    }
}
