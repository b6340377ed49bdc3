// src/lib.rs

//! pkgcore
//!
//! Installation core of a binary package manager: crash-safe unpacking of
//! binary packages onto a root directory and resolution of package
//! queries against an ordered pool of repositories.
//!
//! # Architecture
//!
//! - Install state in SQLite: `half-unpacked` while a package is being
//!   written, `unpacked` once its files and manifest are on disk
//! - Per-package metadata (scripts, properties, file manifest) under
//!   `<root>/var/db/pkgcore/metadata/<pkgname>`
//! - Configuration files reconciled by content hash on update
//! - Repository pool searched by first match or by best version

pub mod config;
pub mod db;
mod error;
pub mod events;
pub mod hash;
pub mod lock;
pub mod packages;
pub mod repository;
pub mod transaction;
pub mod unpack;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
