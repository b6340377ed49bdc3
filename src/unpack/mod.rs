// src/unpack/mod.rs

//! Unpack engine
//!
//! Materializes one binary package onto the root directory:
//!
//! 1. persist `half-unpacked` before anything else
//! 2. make sure the root directory exists
//! 3. on update, drop the previous version's scripts
//! 4. stream the archive: metadata members go to the package metadata
//!    directory, everything else to the root directory
//! 5. on update, remove files the new version no longer ships
//! 6. persist the new file manifest
//! 7. persist `unpacked`
//!
//! A package found in `half-unpacked` state was interrupted somewhere in
//! between and needs to be reinstalled. Files already written are never
//! rolled back.

pub mod conf;
pub mod metadata;
pub mod obsoletes;
pub mod script;

pub use conf::{ConfDecision, ConfPolicy, DefaultConfPolicy};
pub use script::{ScriptArgs, ScriptRunner, ShellScriptRunner};

use crate::config::Config;
use crate::db::{PkgState, StateStore};
use crate::error::{Error, Result};
use crate::events::{NoopReporter, Phase, Reporter, StateEvent, UnpackProgress};
use crate::hash::file_sha256;
use crate::lock::UnpackLock;
use crate::packages::archive::{
    ExtractFlags, FILES_MANIFEST, INSTALL_SCRIPT, REMOVE_SCRIPT, entry_path,
    metadata_member, open_package,
};
use crate::packages::props::normalize_entry_path;
use crate::packages::{
    FileCategory, FileManifest, HashIndex, PackageProps, PackageRecord, escapes_root,
};
use crate::repository::path_from_repository_uri;
use std::fs::{self, DirBuilder};
use std::io::{self, Read};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

/// Non-metadata entries tolerated before both the manifest and the
/// properties have been seen
const METADATA_LOOKAHEAD: usize = 3;

/// Outcome of a successful unpack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Filesystem entries written to the root directory
    pub extracted: usize,
    /// Existing files left alone because their content already matched
    pub skipped: usize,
    /// Configuration files kept as they are on disk
    pub conf_kept: usize,
    /// Files of the previous version removed after an update
    pub obsoletes_removed: usize,
}

/// Unpacks binary packages into the configured root directory
pub struct Unpacker<'a> {
    config: &'a Config,
    state: &'a dyn StateStore,
    reporter: &'a dyn Reporter,
    scripts: &'a dyn ScriptRunner,
    conf_policy: &'a dyn ConfPolicy,
}

impl<'a> Unpacker<'a> {
    pub fn new(config: &'a Config, state: &'a dyn StateStore) -> Self {
        Self {
            config,
            state,
            reporter: &NoopReporter,
            scripts: &ShellScriptRunner,
            conf_policy: &DefaultConfPolicy,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_script_runner(mut self, scripts: &'a dyn ScriptRunner) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_conf_policy(mut self, conf_policy: &'a dyn ConfPolicy) -> Self {
        self.conf_policy = conf_policy;
        self
    }

    /// Unpack the binary package of a resolved record from its repository
    ///
    /// Holds the unpack lock for the whole operation.
    pub fn unpack_binary_pkg(&self, record: &PackageRecord) -> Result<UnpackSummary> {
        self.report_start(record);

        let _lock = UnpackLock::acquire(&self.config.meta_path())
            .map_err(|e| {
                let message = format!("{}: [unpack] failed to acquire unpack lock: {}", record.pkgver, e);
                self.fail(record, e, message)
            })?;

        let path = path_from_repository_uri(record).map_err(|e| {
            let message = format!("{}: [unpack] cannot determine binary package file: {}", record.pkgver, e);
            self.fail(record, e, message)
        })?;
        let mut archive = open_package(&path).map_err(|e| {
            let message = format!(
                "{}: [unpack] failed to open binary package `{}': {}",
                record.pkgver,
                path.display(),
                e
            );
            self.fail(record, e, message)
        })?;

        self.unpack_inner(record, &mut archive)
    }

    /// Unpack `record` from an already opened archive
    pub fn unpack<R: Read>(
        &self,
        record: &PackageRecord,
        archive: &mut Archive<R>,
    ) -> Result<UnpackSummary> {
        self.report_start(record);
        self.unpack_inner(record, archive)
    }

    fn unpack_inner<R: Read>(
        &self,
        record: &PackageRecord,
        archive: &mut Archive<R>,
    ) -> Result<UnpackSummary> {
        let (pkgname, version, pkgver) = (&record.pkgname, &record.version, &record.pkgver);

        self.state
            .set_state(pkgname, version, pkgver, PkgState::HalfUnpacked)
            .map_err(|e| {
                self.fail(
                    record,
                    e,
                    format!("{}: [unpack] failed to set state to half-unpacked", pkgver),
                )
            })?;

        let summary = self.unpack_archive(record, archive).map_err(|e| {
            let message = format!("{}: [unpack] failed to unpack files from archive: {}", pkgver, e);
            self.fail(record, e, message)
        })?;

        self.state
            .set_state(pkgname, version, pkgver, PkgState::Unpacked)
            .map_err(|e| {
                self.fail(
                    record,
                    e,
                    format!("{}: [unpack] failed to set state to unpacked", pkgver),
                )
            })?;

        info!(
            "{}: unpacked ({} extracted, {} unchanged)",
            pkgver, summary.extracted, summary.skipped
        );
        Ok(summary)
    }

    fn unpack_archive<R: Read>(
        &self,
        record: &PackageRecord,
        archive: &mut Archive<R>,
    ) -> Result<UnpackSummary> {
        let pkgname = record.pkgname.as_str();
        let version = record.version.as_str();
        let pkgver = record.pkgver.as_str();
        let update = record.is_update();
        let rootdir = self.config.rootdir.as_path();
        let metadir = self.config.metadata_dir(pkgname);
        let flags = ExtractFlags::for_privilege(self.config.privileged);
        flags.apply_to_archive(archive);
        // Read past the end-of-archive blocks up to the end of the stream so
        // truncation and compressor checksum errors surface as entry errors
        archive.set_ignore_zeros(true);

        self.prepare_rootdir(record)?;

        let old_manifest = if update {
            FileManifest::load(&metadir.join(FILES_MANIFEST)).map_err(|e| {
                let message = format!("{}: [unpack] failed to read installed manifest: {}", pkgver, e);
                self.fail(record, e, message)
            })?
        } else {
            None
        };

        // The new version may not ship these; never run stale scripts
        if update {
            for script in [INSTALL_SCRIPT, REMOVE_SCRIPT] {
                metadata::remove_metafile(&metadir, script).map_err(|e| {
                    let message = format!("{}: [unpack] {}", pkgver, e);
                    self.fail(record, e, message)
                })?;
            }
        }

        let mut props: Option<PackageProps> = None;
        let mut manifest: Option<FileManifest> = None;
        let mut hashes = HashIndex::default();
        let mut progress = UnpackProgress::default();
        let mut summary = UnpackSummary::default();
        let mut nmetadata = 0;
        let mut entry_idx = 0;

        let entries = archive.entries().map_err(|e| {
            Error::ArchiveError(format!("failed to read archive of {}: {}", pkgver, e))
        })?;

        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let message = format!(
                        "{}: [unpack] error while extracting files from `{}': {}",
                        pkgver, record.filename, e
                    );
                    return Err(self.fail(record, Error::ArchiveError(e.to_string()), message));
                }
            };

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }

            let entry_name = entry_path(&entry)?;
            progress.entry = entry_name.clone();
            progress.entry_size = entry.size();
            progress.entry_is_metadata = false;
            progress.entry_is_conf = false;

            if let Some(member) = metadata_member(&entry_name) {
                match member {
                    INSTALL_SCRIPT => {
                        let script = self.extract_metafile(record, &mut entry, &metadir, member, true, flags)?;
                        self.run_pre_install(record, &script)?;
                    }
                    REMOVE_SCRIPT => {
                        self.extract_metafile(record, &mut entry, &metadir, member, true, flags)?;
                    }
                    FILES_MANIFEST => {
                        // Persisted only once the previous one is no longer needed
                        let parsed = FileManifest::from_reader(&mut entry).map_err(|e| {
                            let message = format!("{}: [unpack] invalid `{}': {}", pkgver, member, e);
                            self.fail(record, e, message)
                        })?;
                        hashes = parsed.hash_index();
                        manifest = Some(parsed);
                    }
                    // props.json
                    _ => {
                        let path = self.extract_metafile(record, &mut entry, &metadir, member, false, flags)?;
                        props = Some(PackageProps::load(&path).map_err(|e| {
                            let message = format!("{}: [unpack] invalid `{}': {}", pkgver, member, e);
                            self.fail(record, e, message)
                        })?);
                    }
                }

                nmetadata += 1;
                progress.entry_is_metadata = true;
                progress.entry_extract_count += 1;
                progress.entry_total_count =
                    nmetadata + manifest.as_ref().map_or(0, FileManifest::entry_count);
                self.reporter.progress(&progress);
                continue;
            }

            let (Some(props), Some(manifest)) = (props.as_ref(), manifest.as_ref()) else {
                // Not a binary package if the metadata does not come first
                if entry_idx >= METADATA_LOOKAHEAD {
                    return Err(self.invalid_package(record));
                }
                entry_idx += 1;
                continue;
            };
            progress.entry_total_count = nmetadata + manifest.entry_count();

            if escapes_root(&entry_name) {
                let message = format!(
                    "{}: [unpack] refusing to extract `{}' outside the root directory",
                    pkgver, entry_name
                );
                let err = Error::ArchiveError(format!("entry `{}' escapes the root directory", entry_name));
                return Err(self.fail(record, err, message));
            }

            let normalized = normalize_entry_path(&entry_name);
            let dest = rootdir.join(normalized.trim_start_matches('/'));
            let mut target: Option<PathBuf> = None;

            if entry_type.is_file() {
                let conf_file = props.is_conf_file(&entry_name);
                let category = if conf_file {
                    FileCategory::ConfFiles
                } else {
                    FileCategory::Files
                };
                let exists = fs::metadata(&dest).is_ok();

                if exists && self.content_matches(record, &hashes, category, &normalized, &dest)? {
                    debug!("{}: {} matches current SHA256, skipping", pkgver, normalized);
                    summary.skipped += 1;
                    continue;
                }

                if conf_file && exists {
                    progress.entry_is_conf = true;
                    if update {
                        match self.conf_policy.decide(
                            old_manifest.as_ref(),
                            manifest,
                            &normalized,
                            &dest,
                            version,
                        )? {
                            ConfDecision::KeepCurrent => {
                                debug!("{}: keeping current {}", pkgver, normalized);
                                summary.conf_kept += 1;
                                continue;
                            }
                            ConfDecision::Replace => {}
                            ConfDecision::Merge { dest: new_dest } => {
                                self.report_conf(
                                    record,
                                    format!(
                                        "Installing new configuration file to `{}'.",
                                        new_dest.display()
                                    ),
                                );
                                target = Some(new_dest);
                            }
                        }
                    } else {
                        self.rename_old_conf(record, &dest);
                    }
                }
            }

            flags.apply(&mut entry);
            let extracted = match &target {
                Some(path) => entry.unpack(path).map(|_| ()),
                None => entry.unpack_in(rootdir).and_then(|inside| {
                    if inside {
                        Ok(())
                    } else {
                        Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "entry path escapes the root directory",
                        ))
                    }
                }),
            };
            if let Err(e) = extracted {
                let message = format!(
                    "{}: [unpack] failed to extract file `{}': {}",
                    pkgver, entry_name, e
                );
                return Err(self.fail(record, Error::Io(e), message));
            }

            summary.extracted += 1;
            progress.entry_extract_count += 1;
            self.reporter.progress(&progress);
        }

        let (Some(props), Some(manifest)) = (props, manifest) else {
            return Err(self.invalid_package(record));
        };

        if update && !(record.preserve || props.preserve) {
            if let Some(old) = &old_manifest {
                let obsolete = obsoletes::obsolete_paths(old, &manifest);
                summary.obsoletes_removed =
                    obsoletes::remove_obsoletes(rootdir, &obsolete, pkgname, version, self.reporter);
            }
        }

        manifest.save(&metadir.join(FILES_MANIFEST)).map_err(|e| {
            let message = format!(
                "{}: [unpack] failed to extract metadata file `{}': {}",
                pkgver, FILES_MANIFEST, e
            );
            self.fail(record, e, message)
        })?;

        Ok(summary)
    }

    fn prepare_rootdir(&self, record: &PackageRecord) -> Result<()> {
        let rootdir = &self.config.rootdir;
        let result = match fs::metadata(rootdir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                DirBuilder::new().recursive(true).mode(0o750).create(rootdir)
            }
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            let message = format!(
                "{}: [unpack] failed to access rootdir `{}': {}",
                record.pkgver,
                rootdir.display(),
                e
            );
            self.fail(record, Error::Io(e), message)
        })
    }

    fn extract_metafile<R: Read>(
        &self,
        record: &PackageRecord,
        entry: &mut tar::Entry<'_, R>,
        metadir: &Path,
        member: &str,
        exec: bool,
        flags: ExtractFlags,
    ) -> Result<PathBuf> {
        metadata::extract_metafile(entry, metadir, member, exec, flags).map_err(|e| {
            let message = format!("{}: [unpack] {}", record.pkgver, e);
            self.fail(record, e, message)
        })
    }

    fn run_pre_install(&self, record: &PackageRecord, script: &Path) -> Result<()> {
        let args = ScriptArgs {
            action: "pre",
            pkgname: &record.pkgname,
            version: &record.version,
            update: record.is_update(),
            conffile: self.config.conffile.as_deref(),
            rootdir: &self.config.rootdir,
        };

        let code = self.scripts.run(script, &args).map_err(|e| {
            let message = format!("{}: [unpack] {}", record.pkgver, e);
            self.fail(record, e, message)
        })?;
        if code != 0 {
            let err = Error::ScriptFailed {
                script: INSTALL_SCRIPT.to_string(),
                code,
            };
            let message = format!(
                "{}: [unpack] INSTALL script failed to execute pre ACTION: exit code {}",
                record.pkgver, code
            );
            return Err(self.fail(record, err, message));
        }
        Ok(())
    }

    /// True when the file on disk already has the content the package ships
    ///
    /// A hash that cannot be computed aborts the unpack instead of
    /// assuming the file was modified.
    fn content_matches(
        &self,
        record: &PackageRecord,
        hashes: &HashIndex,
        category: FileCategory,
        path: &str,
        dest: &Path,
    ) -> Result<bool> {
        let Some(recorded) = hashes.get(category, path) else {
            return Ok(false);
        };
        let current = file_sha256(dest).map_err(|e| {
            let message = format!("{}: [unpack] failed to hash `{}': {}", record.pkgver, path, e);
            self.fail(record, e, message)
        })?;
        Ok(current == recorded)
    }

    /// Move an existing configuration file out of the way of a fresh install
    fn rename_old_conf(&self, record: &PackageRecord, dest: &Path) {
        let mut old = dest.as_os_str().to_os_string();
        old.push(".old");
        let old = PathBuf::from(old);

        match fs::rename(dest, &old) {
            Ok(()) => self.report_conf(
                record,
                format!(
                    "Renamed old configuration file `{}' to `{}'.",
                    dest.display(),
                    old.display()
                ),
            ),
            Err(e) => debug!(
                "{}: failed to rename {}: {}",
                record.pkgver,
                dest.display(),
                e
            ),
        }
    }

    fn invalid_package(&self, record: &PackageRecord) -> Error {
        let err = Error::InvalidPackage(record.filename.clone());
        let message = format!(
            "{}: [unpack] invalid binary package `{}'",
            record.pkgver, record.filename
        );
        self.fail(record, err, message)
    }

    fn report_start(&self, record: &PackageRecord) {
        self.reporter.report(
            &StateEvent::new(Phase::Unpack, &record.pkgname, &record.version)
                .with_message(format!("Unpacking package `{}'", record.pkgver)),
        );
    }

    fn report_conf(&self, record: &PackageRecord, message: String) {
        self.reporter.report(
            &StateEvent::new(Phase::ConfigFile, &record.pkgname, &record.version)
                .with_message(message),
        );
    }

    /// Report a terminal failure and hand the error back
    fn fail(&self, record: &PackageRecord, err: Error, message: String) -> Error {
        debug!("{}", message);
        self.reporter.report(
            &StateEvent::new(Phase::UnpackFail, &record.pkgname, &record.version)
                .with_code(err.code())
                .with_message(message),
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::events::EventLog;
    use crate::hash::bytes_sha256;
    use crate::packages::{FileEntry, TransactionType};
    use rusqlite::Connection;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct RecordingRunner {
        calls: RefCell<Vec<String>>,
        exit_code: i32,
    }

    impl ScriptRunner for RecordingRunner {
        fn run(&self, _script: &Path, args: &ScriptArgs<'_>) -> Result<i32> {
            self.calls.borrow_mut().push(format!(
                "{} {} {} {}",
                args.action,
                args.pkgname,
                args.version,
                if args.update { "yes" } else { "no" }
            ));
            Ok(self.exit_code)
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }

    fn package(version: &str, files: &[(&str, &[u8])], install: Option<&str>) -> Vec<u8> {
        let manifest = FileManifest {
            files: files
                .iter()
                .map(|(path, data)| FileEntry {
                    file: path.to_string(),
                    sha256: bytes_sha256(data),
                })
                .collect(),
            ..Default::default()
        };
        let props = PackageProps {
            pkgname: "foo".to_string(),
            version: version.to_string(),
            ..Default::default()
        };

        let mut builder = tar::Builder::new(Vec::new());
        if let Some(script) = install {
            append(&mut builder, "./INSTALL", script.as_bytes());
        }
        append(&mut builder, "./props.json", &serde_json::to_vec(&props).unwrap());
        append(&mut builder, "./files.json", &serde_json::to_vec(&manifest).unwrap());
        for (path, data) in files {
            append(&mut builder, &format!(".{}", path), data);
        }
        builder.into_inner().unwrap()
    }

    fn record(version: &str) -> PackageRecord {
        PackageRecord::new("foo", version, &format!("foo-{}.pkg.tar", version))
    }

    #[test]
    fn test_fresh_install() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let log = EventLog::new();
        let unpacker = Unpacker::new(&config, &db).with_reporter(&log);

        let bytes = package("1.0_1", &[("/usr/bin/foo", b"foo")], None);
        let summary = unpacker
            .unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]))
            .unwrap();

        assert_eq!(summary.extracted, 1);
        assert_eq!(fs::read(root.path().join("usr/bin/foo")).unwrap(), b"foo");
        assert!(config.metadata_dir("foo").join("files.json").exists());
        assert!(config.metadata_dir("foo").join("props.json").exists());
        assert_eq!(db.state("foo").unwrap(), PkgState::Unpacked);
        assert_eq!(log.phase(Phase::Unpack).len(), 1);
        assert!(log.phase(Phase::UnpackFail).is_empty());

        let last = log.progress_updates().pop().unwrap();
        assert_eq!(last.entry_total_count, 3);
        assert_eq!(last.entry_extract_count, 3);
    }

    #[test]
    fn test_install_script_runs_before_files() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let runner = RecordingRunner {
            calls: RefCell::new(Vec::new()),
            exit_code: 0,
        };
        let unpacker = Unpacker::new(&config, &db).with_script_runner(&runner);

        let bytes = package("1.0_1", &[("/usr/bin/foo", b"foo")], Some("exit 0\n"));
        unpacker
            .unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]))
            .unwrap();

        assert_eq!(*runner.calls.borrow(), vec!["pre foo 1.0_1 no".to_string()]);
        assert!(config.metadata_dir("foo").join("INSTALL").exists());
    }

    #[test]
    fn test_failing_install_script_aborts() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let log = EventLog::new();
        let runner = RecordingRunner {
            calls: RefCell::new(Vec::new()),
            exit_code: 3,
        };
        let unpacker = Unpacker::new(&config, &db)
            .with_reporter(&log)
            .with_script_runner(&runner);

        let bytes = package("1.0_1", &[("/usr/bin/foo", b"foo")], Some("exit 3\n"));
        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]));

        assert!(matches!(result, Err(Error::ScriptFailed { code: 3, .. })));
        assert!(!root.path().join("usr/bin/foo").exists());
        assert_eq!(db.state("foo").unwrap(), PkgState::HalfUnpacked);
        assert_eq!(log.phase(Phase::UnpackFail)[0].code, 3);
    }

    #[test]
    fn test_update_removes_stale_scripts() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let runner = RecordingRunner {
            calls: RefCell::new(Vec::new()),
            exit_code: 0,
        };
        let unpacker = Unpacker::new(&config, &db).with_script_runner(&runner);

        let v1 = package("1.0_1", &[("/usr/bin/foo", b"foo")], Some("exit 0\n"));
        unpacker
            .unpack(&record("1.0_1"), &mut tar::Archive::new(&v1[..]))
            .unwrap();
        assert!(config.metadata_dir("foo").join("INSTALL").exists());

        let v2 = package("1.1_1", &[("/usr/bin/foo", b"foo2")], None);
        let mut update = record("1.1_1");
        update.transaction = Some(TransactionType::Update);
        unpacker
            .unpack(&update, &mut tar::Archive::new(&v2[..]))
            .unwrap();

        assert!(!config.metadata_dir("foo").join("INSTALL").exists());
        assert_eq!(fs::read(root.path().join("usr/bin/foo")).unwrap(), b"foo2");
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_state_failure_leaves_root_untouched() {
        struct BrokenStore;
        impl StateStore for BrokenStore {
            fn set_state(&self, _: &str, _: &str, pkgver: &str, _: PkgState) -> Result<()> {
                Err(Error::StateError(pkgver.to_string()))
            }
            fn state(&self, _: &str) -> Result<PkgState> {
                Ok(PkgState::NotInstalled)
            }
        }

        let root = tempdir().unwrap();
        let rootdir = root.path().join("newroot");
        let config = Config::new(&rootdir).with_privileged(false);
        let unpacker = Unpacker::new(&config, &BrokenStore);

        let bytes = package("1.0_1", &[("/usr/bin/foo", b"foo")], None);
        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]));

        assert!(matches!(result, Err(Error::StateError(_))));
        assert!(!rootdir.exists());
    }

    #[test]
    fn test_missing_metadata_rejected() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let log = EventLog::new();
        let unpacker = Unpacker::new(&config, &db).with_reporter(&log);

        let mut builder = tar::Builder::new(Vec::new());
        for name in ["a", "b", "c", "d", "e"] {
            append(&mut builder, &format!("./usr/share/{}", name), b"x");
        }
        let bytes = builder.into_inner().unwrap();

        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]));
        match result {
            Err(e) => assert_eq!(e.code(), 19),
            Ok(_) => panic!("archive without metadata was accepted"),
        }
        assert!(!root.path().join("usr").exists());
        assert_eq!(db.state("foo").unwrap(), PkgState::HalfUnpacked);
    }

    #[test]
    fn test_short_archive_without_metadata_rejected() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let unpacker = Unpacker::new(&config, &db);

        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "./usr/share/a", b"x");
        let bytes = builder.into_inner().unwrap();

        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]));
        assert!(matches!(result, Err(Error::InvalidPackage(_))));
    }

    #[test]
    fn test_truncated_archive_fails() {
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let unpacker = Unpacker::new(&config, &db);

        let data = vec![b'x'; 4096];
        let bytes = package("1.0_1", &[("/usr/share/big", &data[..])], None);
        // Cut into the data of the last member
        let truncated = &bytes[..bytes.len() - 1024 - 3000];

        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(truncated));
        assert!(result.is_err());
        assert_eq!(db.state("foo").unwrap(), PkgState::HalfUnpacked);
    }

    /// Archive holding only props.json and an empty files.json
    fn metadata_builder() -> tar::Builder<Vec<u8>> {
        let props = PackageProps {
            pkgname: "foo".to_string(),
            version: "1.0_1".to_string(),
            ..Default::default()
        };
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "./props.json", &serde_json::to_vec(&props).unwrap());
        append(
            &mut builder,
            "./files.json",
            &serde_json::to_vec(&FileManifest::default()).unwrap(),
        );
        builder
    }

    #[test]
    fn test_corrupt_gzip_trailer_fails() {
        use flate2::Compression;
        use flate2::read::GzDecoder;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(false);
        let db = memory_db();
        let log = EventLog::new();
        let unpacker = Unpacker::new(&config, &db).with_reporter(&log);

        let bytes = package("1.0_1", &[("/usr/bin/foo", b"foo")], None);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        let mut gz = encoder.finish().unwrap();
        // First byte of the CRC32 trailer
        let crc = gz.len() - 8;
        gz[crc] ^= 0xff;

        let result = unpacker.unpack(
            &record("1.0_1"),
            &mut tar::Archive::new(GzDecoder::new(&gz[..])),
        );

        assert!(matches!(result, Err(Error::ArchiveError(_))));
        assert_eq!(db.state("foo").unwrap(), PkgState::HalfUnpacked);
        assert!(!config.metadata_dir("foo").join("files.json").exists());
        assert!(!log.phase(Phase::UnpackFail).is_empty());
    }

    #[test]
    fn test_entry_outside_root_rejected() {
        let base = tempdir().unwrap();
        let rootdir = base.path().join("root");
        let config = Config::new(&rootdir).with_privileged(false);
        let db = memory_db();
        let unpacker = Unpacker::new(&config, &db);

        let mut builder = metadata_builder();
        // tar::Builder refuses `..` in paths, so write the name by hand
        let name = b"./../escape";
        let mut header = tar::Header::new_gnu();
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(1);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let result = unpacker.unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]));

        assert!(matches!(result, Err(Error::ArchiveError(_))));
        assert!(!base.path().join("escape").exists());
        assert_eq!(db.state("foo").unwrap(), PkgState::HalfUnpacked);
    }

    #[test]
    fn test_ownership_follows_privilege() {
        use std::os::unix::fs::MetadataExt;

        let euid = nix::unistd::geteuid();
        let root = tempdir().unwrap();
        let config = Config::new(root.path()).with_privileged(euid.is_root());
        let db = memory_db();
        let unpacker = Unpacker::new(&config, &db);

        let mut builder = metadata_builder();
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o644);
        header.set_uid(4242);
        header.set_gid(4242);
        header.set_cksum();
        builder
            .append_data(&mut header, "./usr/bin/foo", &b"foo"[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        unpacker
            .unpack(&record("1.0_1"), &mut tar::Archive::new(&bytes[..]))
            .unwrap();

        let meta = fs::metadata(root.path().join("usr/bin/foo")).unwrap();
        if euid.is_root() {
            assert_eq!(meta.uid(), 4242);
            assert_eq!(meta.gid(), 4242);
        } else {
            assert_eq!(meta.uid(), euid.as_raw());
        }
    }
}
