// src/error.rs

use nix::errno::Errno;
use thiserror::Error;

/// Core error types for pkgcore
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with path context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Corrupt, truncated or unsupported archive stream
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Archive lacks the required metadata entries
    #[error("Invalid binary package: {0}")]
    InvalidPackage(String),

    /// Package script exited with a non-zero status
    #[error("Script `{script}' failed with exit code {code}")]
    ScriptFailed { script: String, code: i32 },

    /// Install state could not be persisted
    #[error("Failed to persist package state: {0}")]
    StateError(String),

    /// Lookup found nothing
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Package already up to date or already queued
    #[error("Already exists: {0}")]
    ExistsError(String),

    /// Document, version or pattern decode error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Conflicting state (duplicate repository, lock held)
    #[error("Conflict: {0}")]
    ConflictError(String),
}

impl Error {
    /// errno-class code reported to callback sinks
    pub fn code(&self) -> i32 {
        let errno = match self {
            Error::Io(e) => return e.raw_os_error().unwrap_or(Errno::EIO as i32),
            Error::ScriptFailed { code, .. } => return *code,
            Error::Database(_) | Error::IoError(_) | Error::ArchiveError(_) => Errno::EIO,
            Error::InitError(_) | Error::StateError(_) => Errno::EIO,
            Error::DatabaseNotFound(_) | Error::NotFoundError(_) => Errno::ENOENT,
            Error::InvalidPackage(_) => Errno::ENODEV,
            Error::ExistsError(_) => Errno::EEXIST,
            Error::ParseError(_) => Errno::EINVAL,
            Error::ConflictError(_) => Errno::EBUSY,
        };
        errno as i32
    }

    /// True for "absent" results that callers treat as a negative answer
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFoundError(_) | Error::DatabaseNotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias using pkgcore's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidPackage("x".into()).code(), Errno::ENODEV as i32);
        assert_eq!(Error::NotFoundError("x".into()).code(), Errno::ENOENT as i32);
        assert_eq!(Error::ConflictError("x".into()).code(), 16);
        assert_eq!(
            Error::ScriptFailed {
                script: "INSTALL".into(),
                code: 3
            }
            .code(),
            3
        );
        let io = std::io::Error::from_raw_os_error(13);
        assert_eq!(Error::Io(io).code(), 13);
    }

    #[test]
    fn test_not_found_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::Io(io).is_not_found());
        assert!(Error::NotFoundError("pkg".into()).is_not_found());
        assert!(!Error::ArchiveError("bad".into()).is_not_found());
    }
}
