// src/unpack/obsoletes.rs

//! Removal of files dropped by an update

use crate::events::{Phase, Reporter, StateEvent};
use crate::packages::{FileManifest, escapes_root};
use nix::errno::Errno;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Paths owned by `old` that `new` owns in none of its sections
///
/// Order follows `old`: files, then conf_files, then links.
pub fn obsolete_paths(old: &FileManifest, new: &FileManifest) -> Vec<String> {
    let keep = new.path_set();
    old.paths()
        .filter(|path| !keep.contains(path))
        .map(str::to_string)
        .collect()
}

/// Remove `paths` below `rootdir`, returning how many were removed
///
/// Only leaf entries are removed: a path that is already gone counts as
/// done and directories are left in place. Paths with `..` components are
/// never followed out of `rootdir`. A failing removal is reported and the
/// remaining paths are still processed.
pub fn remove_obsoletes(
    rootdir: &Path,
    paths: &[String],
    pkgname: &str,
    version: &str,
    reporter: &dyn Reporter,
) -> usize {
    let mut removed = 0;

    for path in paths {
        if escapes_root(path) {
            warn!("{}-{}: refusing to remove {} outside the root directory", pkgname, version, path);
            reporter.report(
                &StateEvent::new(Phase::RemoveFileObsoleteFail, pkgname, version)
                    .with_code(Errno::EINVAL as i32)
                    .with_message(format!(
                        "refusing to remove obsolete entry `{}' outside the root directory",
                        path
                    )),
            );
            continue;
        }

        let full = rootdir.join(path.trim_start_matches('/'));

        match fs::symlink_metadata(&full) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Ok(meta) if meta.is_dir() => {
                debug!("Leaving obsolete directory {} in place", path);
                continue;
            }
            _ => {}
        }

        match fs::remove_file(&full) {
            Ok(()) => {
                removed += 1;
                reporter.report(
                    &StateEvent::new(Phase::RemoveFileObsolete, pkgname, version)
                        .with_message(format!("Removed obsolete entry: {}", path)),
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("{}-{}: failed to remove obsolete entry {}: {}", pkgname, version, path, e);
                reporter.report(
                    &StateEvent::new(Phase::RemoveFileObsoleteFail, pkgname, version)
                        .with_code(e.raw_os_error().unwrap_or(Errno::EIO as i32))
                        .with_message(format!(
                            "failed to remove obsolete entry `{}': {}",
                            path, e
                        )),
                );
            }
        }
    }

    removed
}
