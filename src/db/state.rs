// src/db/state.rs

//! Persisted install state
//!
//! The install state of a package is the only durable marker the unpack
//! engine maintains: `half-unpacked` from the moment extraction begins,
//! `unpacked` once every entry and the new manifest are on disk. A package
//! left in `half-unpacked` after a crash needs to be reinstalled.

use crate::db::models::InstalledPackage;
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Install state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgState {
    NotInstalled,
    HalfUnpacked,
    Unpacked,
}

impl PkgState {
    pub fn as_str(&self) -> &str {
        match self {
            PkgState::NotInstalled => "not-installed",
            PkgState::HalfUnpacked => "half-unpacked",
            PkgState::Unpacked => "unpacked",
        }
    }
}

impl FromStr for PkgState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not-installed" => Ok(PkgState::NotInstalled),
            "half-unpacked" => Ok(PkgState::HalfUnpacked),
            "unpacked" => Ok(PkgState::Unpacked),
            _ => Err(format!("Invalid package state: {}", s)),
        }
    }
}

impl fmt::Display for PkgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable storage for install states
pub trait StateStore {
    /// Persist `state` for the package `pkgname` at `version`
    fn set_state(&self, pkgname: &str, version: &str, pkgver: &str, state: PkgState) -> Result<()>;

    /// Current state of `pkgname`; `NotInstalled` when unknown
    fn state(&self, pkgname: &str) -> Result<PkgState>;
}

impl StateStore for Connection {
    fn set_state(&self, pkgname: &str, version: &str, pkgver: &str, state: PkgState) -> Result<()> {
        debug!("{}: setting state to {}", pkgver, state);

        // Keep flags of an existing entry across version changes
        let mut pkg = match InstalledPackage::find_by_name(self, pkgname) {
            Ok(Some(existing)) => existing,
            Ok(None) => InstalledPackage::new(pkgname, version, pkgver, state),
            Err(e) => return Err(Error::StateError(format!("{}: {}", pkgver, e))),
        };
        pkg.version = version.to_string();
        pkg.pkgver = pkgver.to_string();
        pkg.state = state;

        pkg.upsert(self)
            .map(|_| ())
            .map_err(|e| Error::StateError(format!("{}: {}", pkgver, e)))
    }

    fn state(&self, pkgname: &str) -> Result<PkgState> {
        Ok(InstalledPackage::find_by_name(self, pkgname)?
            .map(|pkg| pkg.state)
            .unwrap_or(PkgState::NotInstalled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_unknown_package_is_not_installed() {
        let conn = memory_db();
        assert_eq!(conn.state("foo").unwrap(), PkgState::NotInstalled);
    }

    #[test]
    fn test_state_transitions_persist() {
        let conn = memory_db();

        conn.set_state("foo", "1.0_1", "foo-1.0_1", PkgState::HalfUnpacked)
            .unwrap();
        assert_eq!(conn.state("foo").unwrap(), PkgState::HalfUnpacked);

        conn.set_state("foo", "1.0_1", "foo-1.0_1", PkgState::Unpacked)
            .unwrap();
        assert_eq!(conn.state("foo").unwrap(), PkgState::Unpacked);
    }

    #[test]
    fn test_set_state_keeps_flags() {
        let conn = memory_db();
        let mut pkg = InstalledPackage::new("foo", "1.0_1", "foo-1.0_1", PkgState::Unpacked);
        pkg.automatic_install = true;
        pkg.upsert(&conn).unwrap();

        conn.set_state("foo", "1.1_1", "foo-1.1_1", PkgState::HalfUnpacked)
            .unwrap();
        let found = InstalledPackage::find_by_name(&conn, "foo").unwrap().unwrap();
        assert!(found.automatic_install);
        assert_eq!(found.version, "1.1_1");
    }

    #[test]
    fn test_state_names() {
        for s in ["not-installed", "half-unpacked", "unpacked"] {
            assert_eq!(PkgState::from_str(s).unwrap().as_str(), s);
        }
        assert!(PkgState::from_str("installed").is_err());
    }
}
