// src/lock.rs

//! Exclusive unpack lock
//!
//! Only one unpack may run against a root directory at a time. The lock is
//! an exclusive `flock` on `unpack.lock` under the metadata prefix, held
//! for as long as the guard lives. The kernel drops it when the holder
//! exits, so a lock file left behind by a crashed unpack is simply reused.

use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "unpack.lock";

/// Guard holding the unpack lock
#[derive(Debug)]
pub struct UnpackLock {
    path: PathBuf,
    _file: Flock<File>,
}

impl UnpackLock {
    /// Take the lock in `meta_path`, creating the directory if needed
    ///
    /// Never blocks: a lock held by another process is a `ConflictError`.
    pub fn acquire(meta_path: &Path) -> Result<Self> {
        fs::create_dir_all(meta_path).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", meta_path.display(), e))
        })?;

        let path = meta_path.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                Error::IoError(format!("Failed to open lock file {}: {}", path.display(), e))
            })?;

        let file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => file,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(Error::ConflictError(format!(
                    "Another unpack is in progress (lock file {} is held)",
                    path.display()
                )));
            }
            Err((_, errno)) => {
                return Err(Error::IoError(format!(
                    "Failed to lock {}: {}",
                    path.display(),
                    errno
                )));
            }
        };

        // Informational only; the flock is what excludes other unpacks
        file.set_len(0)?;
        writeln!(&*file, "{}", std::process::id())?;

        debug!("Acquired unpack lock {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
