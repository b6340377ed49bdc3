// src/db/schema.rs

//! Database schema definitions and migrations for the pkgdb
//!
//! This module defines the SQLite schema for all core tables and provides
//! a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// Creates the repository registry: each row is one package source,
/// consulted in priority order when building the repository pool.
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            location TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_repositories_enabled ON repositories(enabled);
        CREATE INDEX idx_repositories_priority ON repositories(priority);
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: installed packages and their install state
///
/// The `state` column is the crash-recovery marker written around every
/// unpack (`half-unpacked` while extracting, `unpacked` once complete).
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pkgname TEXT NOT NULL UNIQUE,
            version TEXT NOT NULL,
            pkgver TEXT NOT NULL,
            state TEXT NOT NULL CHECK(state IN ('not-installed', 'half-unpacked', 'unpacked')),
            automatic_install INTEGER NOT NULL DEFAULT 0,
            hold INTEGER NOT NULL DEFAULT 0,
            repository TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX idx_packages_state ON packages(state);
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}
