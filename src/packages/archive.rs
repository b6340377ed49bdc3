// src/packages/archive.rs

//! Binary package archives
//!
//! A binary package is a (possibly compressed) tar stream. Its metadata
//! members come first: `./INSTALL`, `./REMOVE`, `./files.json` and
//! `./props.json`, followed by the filesystem objects relative to the
//! root directory.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::{Archive, Entry};
use tracing::debug;
use xz2::read::XzDecoder;

/// Pre/post install script
pub const INSTALL_SCRIPT: &str = "INSTALL";
/// Pre/post removal script
pub const REMOVE_SCRIPT: &str = "REMOVE";
/// File manifest
pub const FILES_MANIFEST: &str = "files.json";
/// Package properties
pub const PACKAGE_PROPS: &str = "props.json";

/// Package compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Zstd,
    Xz,
    Gzip,
    None,
}

/// Metadata member an archive entry corresponds to, if any
pub fn metadata_member(entry_path: &str) -> Option<&'static str> {
    match entry_path.trim_start_matches("./") {
        INSTALL_SCRIPT => Some(INSTALL_SCRIPT),
        REMOVE_SCRIPT => Some(REMOVE_SCRIPT),
        FILES_MANIFEST => Some(FILES_MANIFEST),
        PACKAGE_PROPS => Some(PACKAGE_PROPS),
        _ => None,
    }
}

/// Detect compression from magic bytes, falling back to the file extension
pub fn detect_compression(path: &Path) -> Result<CompressionFormat> {
    let mut file = File::open(path).map_err(|e| {
        Error::IoError(format!("Failed to open package {}: {}", path.display(), e))
    })?;
    let mut magic = [0u8; 6];
    let read = file.read(&mut magic)?;
    let magic = &magic[..read];

    if magic.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
        return Ok(CompressionFormat::Zstd);
    }
    if magic.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
        return Ok(CompressionFormat::Xz);
    }
    if magic.starts_with(&[0x1F, 0x8B]) {
        return Ok(CompressionFormat::Gzip);
    }

    let name = path.to_string_lossy();
    if name.ends_with(".zst") {
        Ok(CompressionFormat::Zstd)
    } else if name.ends_with(".xz") {
        Ok(CompressionFormat::Xz)
    } else if name.ends_with(".gz") {
        Ok(CompressionFormat::Gzip)
    } else {
        Ok(CompressionFormat::None)
    }
}

/// Open and decompress a binary package
pub fn open_package(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let compression = detect_compression(path)?;
    debug!("Opening {} ({:?})", path.display(), compression);

    let file = File::open(path).map_err(|e| {
        Error::IoError(format!("Failed to open package {}: {}", path.display(), e))
    })?;
    let file = BufReader::new(file);

    let reader: Box<dyn Read> = match compression {
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::with_buffer(file).map_err(|e| {
                Error::ArchiveError(format!("Failed to create zstd decoder: {}", e))
            })?;
            Box::new(decoder)
        }
        CompressionFormat::Xz => Box::new(XzDecoder::new(file)),
        CompressionFormat::Gzip => Box::new(GzDecoder::new(file)),
        CompressionFormat::None => Box::new(file),
    };

    Ok(Archive::new(reader))
}

/// Read a single metadata member (e.g. `props.json`) from a binary package
///
/// Returns `None` when the archive has no such member.
pub fn read_member(path: &Path, member: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open_package(path)?;
    let entries = archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("Failed to read archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ArchiveError(format!("Failed to read entry: {}", e)))?;
        let entry_path = entry_path(&entry)?;
        if entry_path.trim_start_matches("./") == member {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(|e| {
                Error::ArchiveError(format!("Failed to read {}: {}", member, e))
            })?;
            return Ok(Some(content));
        }
    }

    Ok(None)
}

/// Archive path of an entry as a string
pub fn entry_path<R: Read>(entry: &Entry<'_, R>) -> Result<String> {
    let path = entry
        .path()
        .map_err(|e| Error::ArchiveError(format!("Failed to get entry path: {}", e)))?;
    Ok(path.to_string_lossy().to_string())
}

/// Options applied to every extracted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractFlags {
    pub preserve_permissions: bool,
    pub preserve_ownerships: bool,
    pub preserve_mtime: bool,
    pub unpack_xattrs: bool,
}

impl ExtractFlags {
    /// Flags for the current privilege level
    pub fn for_privilege(privileged: bool) -> Self {
        if privileged {
            Self {
                preserve_permissions: true,
                preserve_ownerships: true,
                preserve_mtime: true,
                unpack_xattrs: true,
            }
        } else {
            Self {
                preserve_permissions: true,
                preserve_ownerships: false,
                preserve_mtime: true,
                unpack_xattrs: false,
            }
        }
    }

    /// Archive-wide options; ownership can only be set here
    pub fn apply_to_archive<R: Read>(&self, archive: &mut Archive<R>) {
        archive.set_preserve_ownerships(self.preserve_ownerships);
    }

    /// Per-entry options
    pub fn apply<R: Read>(&self, entry: &mut Entry<'_, R>) {
        entry.set_preserve_permissions(self.preserve_permissions);
        entry.set_preserve_mtime(self.preserve_mtime);
        entry.set_unpack_xattrs(self.unpack_xattrs);
    }
}
