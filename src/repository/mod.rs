// src/repository/mod.rs

//! Repository management and lookup
//!
//! This module provides functionality for:
//! - Registering local package repositories in the pkgdb
//! - Loading repository indexes (`index.json`)
//! - Resolving package queries against the repository pool
//! - Locating binary packages inside a repository

pub mod index;
pub mod pool;

pub use index::RepositoryIndex;
pub use pool::RepositoryPool;

use crate::db::models::Repository;
use crate::error::{Error, Result};
use crate::packages::PackageRecord;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Index file at the top of every repository
pub const INDEX_FILE: &str = "index.json";

/// Scheme prefix accepted for local repositories
const FILE_SCHEME: &str = "file://";

/// Repository index format
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

impl RepositoryMetadata {
    /// Write `index.json` into the repository directory
    pub fn save(&self, location: &Path) -> Result<()> {
        fs::create_dir_all(location).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", location.display(), e))
        })?;

        let mut temp = NamedTempFile::new_in(location)?;
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::ParseError(format!("Failed to encode index: {}", e)))?;
        temp.write_all(&data)?;
        let path = location.join(INDEX_FILE);
        temp.persist(&path).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", path.display(), e.error))
        })?;
        Ok(())
    }
}

/// Local directory of a repository location
fn local_path(location: &str) -> Result<PathBuf> {
    let path = location.strip_prefix(FILE_SCHEME).unwrap_or(location);
    if path.contains("://") {
        return Err(Error::IoError(format!(
            "Remote repository '{}' is not supported",
            location
        )));
    }
    Ok(PathBuf::from(path))
}

/// Load the index of the repository at `location`
pub fn load_index(location: &Path) -> Result<RepositoryIndex> {
    let location_str = location.to_string_lossy();
    let dir = local_path(&location_str)?;
    let path = dir.join(INDEX_FILE);
    debug!("Loading repository index {}", path.display());

    let content = fs::read(&path).map_err(|e| {
        Error::IoError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let metadata: RepositoryMetadata = serde_json::from_slice(&content).map_err(|e| {
        Error::ParseError(format!("Invalid repository index {}: {}", path.display(), e))
    })?;

    Ok(RepositoryIndex::from_metadata(location_str, metadata))
}

/// Path of the binary package a resolved record refers to
pub fn path_from_repository_uri(record: &PackageRecord) -> Result<PathBuf> {
    let location = record.repository.as_deref().ok_or_else(|| {
        Error::NotFoundError(format!("{}: no repository recorded", record.pkgver))
    })?;
    Ok(local_path(location)?.join(&record.filename))
}

/// Add a new repository to the database
pub fn add_repository(
    conn: &Connection,
    name: String,
    location: String,
    enabled: bool,
    priority: i32,
) -> Result<Repository> {
    // Check if repository with this name already exists
    if Repository::find_by_name(conn, &name)?.is_some() {
        return Err(Error::ConflictError(format!(
            "Repository '{}' already exists",
            name
        )));
    }
    local_path(&location)?;

    let mut repo = Repository::new(name, location);
    repo.enabled = enabled;
    repo.priority = priority;

    repo.insert(conn)?;

    info!("Added repository: {} ({})", repo.name, repo.location);
    Ok(repo)
}

/// Remove a repository from the database
pub fn remove_repository(conn: &Connection, name: &str) -> Result<()> {
    let repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{}' not found", name)))?;

    if let Some(id) = repo.id {
        Repository::delete(conn, id)?;
    }
    info!("Removed repository: {}", name);
    Ok(())
}

/// Enable or disable a repository
pub fn set_repository_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<()> {
    let mut repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{}' not found", name)))?;

    repo.enabled = enabled;
    repo.update(conn)?;

    info!(
        "Repository '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// All registered repositories in pool order
pub fn list_repositories(conn: &Connection) -> Result<Vec<Repository>> {
    Repository::list_all(conn)
}
