// src/db/models.rs

//! Data models for pkgdb entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::db::state::PkgState;
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

const PACKAGE_COLUMNS: &str =
    "id, pkgname, version, pkgver, state, automatic_install, hold, repository, updated_at";

/// An entry of the installed package database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub id: Option<i64>,
    pub pkgname: String,
    pub version: String,
    pub pkgver: String,
    pub state: PkgState,
    pub automatic_install: bool,
    /// Excluded from bulk updates
    pub hold: bool,
    pub repository: Option<String>,
    pub updated_at: Option<String>,
}

impl InstalledPackage {
    /// Create a new InstalledPackage
    pub fn new(pkgname: &str, version: &str, pkgver: &str, state: PkgState) -> Self {
        Self {
            id: None,
            pkgname: pkgname.to_string(),
            version: version.to_string(),
            pkgver: pkgver.to_string(),
            state,
            automatic_install: false,
            hold: false,
            repository: None,
            updated_at: None,
        }
    }

    /// Insert this package, or update the existing row with the same name
    pub fn upsert(&mut self, conn: &Connection) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO packages (pkgname, version, pkgver, state, automatic_install, hold, repository, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(pkgname) DO UPDATE SET
                version = excluded.version,
                pkgver = excluded.pkgver,
                state = excluded.state,
                automatic_install = excluded.automatic_install,
                hold = excluded.hold,
                repository = excluded.repository,
                updated_at = excluded.updated_at",
            params![
                &self.pkgname,
                &self.version,
                &self.pkgver,
                self.state.as_str(),
                self.automatic_install as i32,
                self.hold as i32,
                &self.repository,
                &now,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM packages WHERE pkgname = ?1",
            [&self.pkgname],
            |row| row.get(0),
        )?;
        self.id = Some(id);
        self.updated_at = Some(now);
        Ok(id)
    }

    /// Find an installed package by name
    pub fn find_by_name(conn: &Connection, pkgname: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE pkgname = ?1",
            PACKAGE_COLUMNS
        ))?;

        let pkg = stmt.query_row([pkgname], Self::from_row).optional()?;

        Ok(pkg)
    }

    /// List all packages
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY pkgname",
            PACKAGE_COLUMNS
        ))?;

        let pkgs = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pkgs)
    }

    /// Set or clear the hold flag
    pub fn set_hold(conn: &Connection, pkgname: &str, hold: bool) -> Result<()> {
        let changed = conn.execute(
            "UPDATE packages SET hold = ?1 WHERE pkgname = ?2",
            params![hold as i32, pkgname],
        )?;
        if changed == 0 {
            return Err(Error::NotFoundError(format!(
                "Package '{}' is not installed",
                pkgname
            )));
        }
        Ok(())
    }

    /// Delete a package entry by name
    pub fn delete(conn: &Connection, pkgname: &str) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE pkgname = ?1", [pkgname])?;
        Ok(())
    }

    /// Convert a database row to an InstalledPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let state_str: String = row.get(4)?;
        let state = PkgState::from_str(&state_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            pkgname: row.get(1)?,
            version: row.get(2)?,
            pkgver: row.get(3)?,
            state,
            automatic_install: row.get::<_, i32>(5)? != 0,
            hold: row.get::<_, i32>(6)? != 0,
            repository: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Repository represents a package source registered in the pkgdb
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    /// Directory holding `index.json` and the binary packages
    pub location: String,
    pub enabled: bool,
    /// Higher priority repositories are consulted first
    pub priority: i32,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new Repository
    pub fn new(name: String, location: String) -> Self {
        Self {
            id: None,
            name,
            location,
            enabled: true,
            priority: 0,
            created_at: None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, location, enabled, priority)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.name,
                &self.location,
                self.enabled as i32,
                &self.priority,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, location, enabled, priority, created_at
             FROM repositories WHERE name = ?1",
        )?;

        let repo = stmt.query_row([name], Self::from_row).optional()?;

        Ok(repo)
    }

    /// List all repositories in pool order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, location, enabled, priority, created_at
             FROM repositories ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// List enabled repositories in pool order
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, location, enabled, priority, created_at
             FROM repositories WHERE enabled = 1 ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// Update repository settings
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            Error::InitError("Cannot update repository without ID".to_string())
        })?;

        conn.execute(
            "UPDATE repositories SET name = ?1, location = ?2, enabled = ?3, priority = ?4
             WHERE id = ?5",
            params![
                &self.name,
                &self.location,
                self.enabled as i32,
                &self.priority,
                id,
            ],
        )?;

        Ok(())
    }

    /// Delete a repository by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            location: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
            priority: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
