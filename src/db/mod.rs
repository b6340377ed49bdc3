// src/db/mod.rs

//! Package database (pkgdb)
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema creation
//! - Connection management
//! - Transaction handling
//! - Persisted install state and repository registrations

pub mod models;
pub mod schema;
pub mod state;

pub use state::{PkgState, StateStore};

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::{debug, info};

/// Initialize a new pkgdb at the specified path
///
/// Creates the database file and applies all schema migrations.
/// This is idempotent - calling it on an existing database is safe.
///
/// # Arguments
///
/// * `db_path` - Path where the database should be created
pub fn init(db_path: &Path) -> Result<()> {
    debug!("Initializing database at: {}", db_path.display());

    // Create parent directories if they don't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing pkgdb
///
/// # Arguments
///
/// * `db_path` - Path to the database file
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound(db_path.display().to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    Ok(conn)
}

/// Open the pkgdb, creating it first if it does not exist yet
pub fn open_or_init(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        init(db_path)?;
    }
    open(db_path)
}

/// Run `f` inside a database transaction
///
/// The transaction commits when `f` returns `Ok` and rolls back otherwise.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
