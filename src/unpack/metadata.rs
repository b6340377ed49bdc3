// src/unpack/metadata.rs

//! Package metadata files (`<metadir>/metadata/<pkgname>/...`)

use crate::error::{Error, Result};
use crate::packages::archive::ExtractFlags;
use std::fs::{self, DirBuilder, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tar::Entry;

/// Mode forced on extracted package scripts
const SCRIPT_MODE: u32 = 0o750;

/// Create a package metadata directory (and its parents) with mode 0755
pub fn create_metadir(metadir: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(metadir)
        .map_err(|e| {
            Error::IoError(format!(
                "failed to create metadir `{}': {}",
                metadir.display(),
                e
            ))
        })
}

/// Extract an archive entry as metadata file `file` of the package
///
/// The entry lands at `<metadir>/<file>` regardless of its archive path.
/// Scripts (`exec`) are made executable by owner and group only.
pub fn extract_metafile<R: Read>(
    entry: &mut Entry<'_, R>,
    metadir: &Path,
    file: &str,
    exec: bool,
    flags: ExtractFlags,
) -> Result<PathBuf> {
    create_metadir(metadir)?;

    let dest = metadir.join(file);
    flags.apply(entry);
    entry.unpack(&dest).map_err(|e| {
        Error::IoError(format!("failed to extract metafile `{}': {}", file, e))
    })?;

    if exec {
        fs::set_permissions(&dest, Permissions::from_mode(SCRIPT_MODE)).map_err(|e| {
            Error::IoError(format!("failed to set mode of metafile `{}': {}", file, e))
        })?;
    }

    Ok(dest)
}

/// Remove metadata file `file` of the package; a missing file is not an error
pub fn remove_metafile(metadir: &Path, file: &str) -> Result<()> {
    match fs::remove_file(metadir.join(file)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IoError(format!(
            "failed to remove metafile `{}': {}",
            file, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_script_is_executable() {
        let dir = tempdir().unwrap();

        let mut builder = tar::Builder::new(Vec::new());
        let data = b"#!/bin/sh\nexit 0\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "./INSTALL", &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let mut entry = archive.entries().unwrap().next().unwrap().unwrap();

        let metadir = dir.path().join("metadata/foo");
        let flags = ExtractFlags::for_privilege(false);
        let path = extract_metafile(&mut entry, &metadir, "INSTALL", true, flags).unwrap();

        assert_eq!(path, metadir.join("INSTALL"));
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SCRIPT_MODE);
    }

    #[test]
    fn test_remove_missing_metafile_is_ok() {
        let dir = tempdir().unwrap();
        assert!(remove_metafile(dir.path(), "REMOVE").is_ok());

        fs::write(dir.path().join("REMOVE"), b"x").unwrap();
        remove_metafile(dir.path(), "REMOVE").unwrap();
        assert!(!dir.path().join("REMOVE").exists());
    }
}
