// src/packages/mod.rs

//! Binary package data model
//!
//! Typed views over the documents a binary package carries (properties and
//! file manifest), the package record published by repositories, and the
//! archive container itself.

pub mod archive;
pub mod manifest;
pub mod props;
pub mod record;

pub use manifest::{FileCategory, FileEntry, FileManifest, HashIndex, LinkEntry};
pub use props::{PackageProps, escapes_root};
pub use record::{PackageRecord, TransactionType};
