// src/transaction.rs

//! Transaction queue
//!
//! Resolves single package requests against the repository pool and the
//! pkgdb and queues the resulting records with the action to perform.
//! Dependency resolution is not done here: every request queues exactly
//! one package.

use crate::db::PkgState;
use crate::db::models::InstalledPackage;
use crate::error::{Error, Result};
use crate::packages::{PackageRecord, TransactionType};
use crate::repository::RepositoryPool;
use crate::unpack::{UnpackSummary, Unpacker};
use crate::version::{cmpver, pkg_name, pkgpattern_name};
use rusqlite::Connection;
use std::cmp::Ordering;
use tracing::{debug, info};

/// What a request resolved to before the installed state is considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Update,
    Reinstall,
}

/// True when `query` is a pattern or a pkgver rather than a plain name
fn is_pattern(query: &str) -> bool {
    query.contains(['<', '>', '*', '?', '[']) || pkg_name(query).is_some()
}

/// Package name a query refers to
fn query_name(query: &str) -> &str {
    if is_pattern(query) {
        pkgpattern_name(query).unwrap_or(query)
    } else {
        query
    }
}

pub struct Transaction<'a> {
    conn: &'a Connection,
    pool: &'a RepositoryPool,
    packages: Vec<PackageRecord>,
}

impl<'a> Transaction<'a> {
    pub fn new(conn: &'a Connection, pool: &'a RepositoryPool) -> Self {
        Self {
            conn,
            pool,
            packages: Vec::new(),
        }
    }

    /// Queued packages in queue order
    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Queue the installation of `query` (a name, pattern or pkgver)
    ///
    /// An installed package is updated instead; with `reinstall` it is
    /// installed again unless the repository has a newer version.
    pub fn install_pkg(&mut self, query: &str, reinstall: bool) -> Result<()> {
        self.find_pkg(query, reinstall)
    }

    /// Queue the update of an installed package
    pub fn update_pkg(&mut self, query: &str) -> Result<()> {
        self.find_pkg(query, false)
    }

    /// Queue updates for every installed package not on hold
    ///
    /// Returns `ExistsError` when nothing needs updating.
    pub fn update_packages(&mut self) -> Result<()> {
        let mut found = false;

        for pkg in InstalledPackage::list_all(self.conn)? {
            if pkg.hold {
                debug!("{}: on hold, ignoring updates", pkg.pkgver);
                continue;
            }
            match self.find_pkg(&pkg.pkgname, false) {
                Ok(()) => found = true,
                Err(Error::NotFoundError(_))
                | Err(Error::ExistsError(_))
                | Err(Error::InvalidPackage(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if found {
            Ok(())
        } else {
            Err(Error::ExistsError("All packages are up to date".to_string()))
        }
    }

    /// Queue the removal of an installed package
    pub fn remove_pkg(&mut self, pkgname: &str) -> Result<()> {
        let pkg = InstalledPackage::find_by_name(self.conn, pkgname)?
            .ok_or_else(|| Error::NotFoundError(format!("Package '{}' is not installed", pkgname)))?;

        let mut record = PackageRecord::new(&pkg.pkgname, &pkg.version, "");
        record.repository = pkg.repository;
        record.automatic_install = pkg.automatic_install;
        record.transaction = Some(TransactionType::Remove);

        debug!("{}: added into transaction (remove)", record.pkgver);
        self.store(record);
        Ok(())
    }

    fn find_pkg(&mut self, query: &str, reinstall: bool) -> Result<()> {
        let by_pattern = is_pattern(query);
        let installed = InstalledPackage::find_by_name(self.conn, query_name(query))?;

        let (mut action, repo_pkg) = match &installed {
            None => {
                let found = match self.pool.find_pkg(query, by_pattern, true)? {
                    Some(pkg) => Some(pkg),
                    None => self.pool.find_virtualpkg(query, by_pattern)?,
                };
                (Action::Install, found)
            }
            Some(_) => {
                let action = if reinstall {
                    Action::Reinstall
                } else {
                    Action::Update
                };
                (action, self.pool.find_pkg(query, by_pattern, true)?)
            }
        };
        let mut repo_pkg = repo_pkg.ok_or_else(|| {
            Error::NotFoundError(format!("Package '{}' not found in repository pool", query))
        })?;

        if let Some(inst) = &installed {
            let ord = cmpver(&repo_pkg.pkgver, &inst.pkgver);
            match action {
                Action::Update if ord != Ordering::Greater => {
                    debug!(
                        "Skipping `{}' (installed: {}) from repository `{}'",
                        repo_pkg.pkgver,
                        inst.pkgver,
                        repo_pkg.repository.as_deref().unwrap_or_default()
                    );
                    return Err(Error::ExistsError(format!(
                        "{} is already up to date",
                        inst.pkgver
                    )));
                }
                Action::Reinstall if ord == Ordering::Greater => action = Action::Update,
                _ => {}
            }
            repo_pkg.automatic_install = inst.automatic_install;
        }

        if action == Action::Update && self.packages.iter().any(|p| p.pkgver == repo_pkg.pkgver) {
            debug!("`{}' already queued in transaction", repo_pkg.pkgver);
            return Err(Error::ExistsError(format!(
                "{} is already queued",
                repo_pkg.pkgver
            )));
        }

        let state = installed
            .as_ref()
            .filter(|inst| inst.pkgname == repo_pkg.pkgname)
            .map_or(PkgState::NotInstalled, |inst| inst.state);
        let transaction = match (action, state) {
            (_, PkgState::NotInstalled) => TransactionType::Install,
            (Action::Install, PkgState::Unpacked) => TransactionType::Configure,
            (Action::Update, _) => TransactionType::Update,
            _ => TransactionType::Install,
        };
        repo_pkg.transaction = Some(transaction);

        debug!("{}: added into transaction ({})", repo_pkg.pkgver, transaction);
        self.store(repo_pkg);
        Ok(())
    }

    /// Add a record, replacing a queued record for the same package
    fn store(&mut self, record: PackageRecord) {
        match self
            .packages
            .iter_mut()
            .find(|p| p.pkgname == record.pkgname)
        {
            Some(existing) => *existing = record,
            None => self.packages.push(record),
        }
    }

    /// Unpack every queued install and update
    ///
    /// Packages queued for configuration or removal are left for the
    /// caller.
    pub fn commit(&self, unpacker: &Unpacker<'_>) -> Result<Vec<(String, UnpackSummary)>> {
        let mut results = Vec::new();

        for record in &self.packages {
            match record.transaction {
                Some(TransactionType::Install) | Some(TransactionType::Update) => {}
                other => {
                    debug!("{}: nothing to unpack for {:?}", record.pkgver, other);
                    continue;
                }
            }

            let summary = unpacker.unpack_binary_pkg(record)?;

            if let Some(mut pkg) = InstalledPackage::find_by_name(self.conn, &record.pkgname)? {
                pkg.repository = record.repository.clone();
                pkg.automatic_install = record.automatic_install;
                pkg.upsert(self.conn)?;
            }
            info!("{}: {} complete", record.pkgver, record.transaction.map_or("unpack", |t| t.as_str()));
            results.push((record.pkgver.clone(), summary));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::schema;
    use crate::repository::{RepositoryIndex, RepositoryMetadata};

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version, &format!("{}-{}.pkg", name, version))
    }

    fn pool(packages: Vec<PackageRecord>) -> RepositoryPool {
        let index =
            RepositoryIndex::from_metadata("/srv/repo", RepositoryMetadata { name: None, packages });
        RepositoryPool::new(&Config::default(), vec![index])
    }

    fn install(conn: &Connection, name: &str, version: &str, state: PkgState) {
        InstalledPackage::new(name, version, &format!("{}-{}", name, version), state)
            .upsert(conn)
            .unwrap();
    }

    #[test]
    fn test_install_new_package() {
        let conn = memory_db();
        let pool = pool(vec![record("foo", "1.0_1")]);
        let mut trans = Transaction::new(&conn, &pool);

        trans.install_pkg("foo", false).unwrap();
        let queued = &trans.packages()[0];
        assert_eq!(queued.transaction, Some(TransactionType::Install));
        assert_eq!(queued.repository.as_deref(), Some("/srv/repo"));

        assert!(matches!(
            trans.install_pkg("missing", false),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_install_through_virtual_package() {
        let conn = memory_db();
        let mut nano = record("nano", "2.2_1");
        nano.provides = vec!["editor".to_string()];
        let pool = pool(vec![nano]);
        let mut trans = Transaction::new(&conn, &pool);

        trans.install_pkg("editor", false).unwrap();
        assert_eq!(trans.packages()[0].pkgname, "nano");
    }

    #[test]
    fn test_installed_package_is_updated() {
        let conn = memory_db();
        install(&conn, "foo", "1.0_1", PkgState::Unpacked);
        let pool = pool(vec![record("foo", "1.1_1")]);
        let mut trans = Transaction::new(&conn, &pool);

        trans.install_pkg("foo", false).unwrap();
        assert_eq!(trans.packages()[0].transaction, Some(TransactionType::Update));

        // Same pkgver again
        assert!(matches!(trans.update_pkg("foo"), Err(Error::ExistsError(_))));
    }

    #[test]
    fn test_up_to_date_package_is_skipped() {
        let conn = memory_db();
        install(&conn, "foo", "1.1_1", PkgState::Unpacked);
        let pool = pool(vec![record("foo", "1.1_1")]);
        let mut trans = Transaction::new(&conn, &pool);

        assert!(matches!(trans.update_pkg("foo"), Err(Error::ExistsError(_))));

        trans.install_pkg("foo", true).unwrap();
        assert_eq!(trans.packages()[0].transaction, Some(TransactionType::Install));
    }

    #[test]
    fn test_reinstall_promoted_to_update() {
        let conn = memory_db();
        install(&conn, "foo", "1.0_1", PkgState::Unpacked);
        let pool = pool(vec![record("foo", "1.1_1")]);
        let mut trans = Transaction::new(&conn, &pool);

        trans.install_pkg("foo", true).unwrap();
        assert_eq!(trans.packages()[0].transaction, Some(TransactionType::Update));
    }

    #[test]
    fn test_update_packages_skips_hold() {
        let conn = memory_db();
        install(&conn, "foo", "1.0_1", PkgState::Unpacked);
        install(&conn, "bar", "1.0_1", PkgState::Unpacked);
        install(&conn, "gone", "1.0_1", PkgState::Unpacked);
        InstalledPackage::set_hold(&conn, "bar", true).unwrap();
        let pool = pool(vec![record("foo", "2.0_1"), record("bar", "2.0_1")]);

        let mut trans = Transaction::new(&conn, &pool);
        trans.update_packages().unwrap();
        assert_eq!(trans.packages().len(), 1);
        assert_eq!(trans.packages()[0].pkgname, "foo");

        let mut again = Transaction::new(&conn, &pool);
        InstalledPackage::set_hold(&conn, "foo", true).unwrap();
        assert!(matches!(again.update_packages(), Err(Error::ExistsError(_))));
    }

    #[test]
    fn test_remove_pkg() {
        let conn = memory_db();
        install(&conn, "foo", "1.0_1", PkgState::Unpacked);
        let pool = pool(Vec::new());
        let mut trans = Transaction::new(&conn, &pool);

        trans.remove_pkg("foo").unwrap();
        assert_eq!(trans.packages()[0].transaction, Some(TransactionType::Remove));
        assert!(matches!(trans.remove_pkg("bar"), Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_query_helpers() {
        assert!(!is_pattern("foo"));
        assert!(is_pattern("foo>=1.0"));
        assert!(is_pattern("foo-1.0_1"));
        assert_eq!(query_name("foo>=1.0"), "foo");
        assert_eq!(query_name("foo-1.0_1"), "foo");
        assert_eq!(query_name("gtk+"), "gtk+");
    }
}
