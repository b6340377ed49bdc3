// src/packages/record.rs

//! Package records: the metadata describing one package release as
//! published by a repository and queued into a transaction

use crate::packages::props::PackageProps;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Action a transaction performs on a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Install,
    Update,
    Configure,
    Remove,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Install => "install",
            TransactionType::Update => "update",
            TransactionType::Configure => "configure",
            TransactionType::Remove => "remove",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "install" => Ok(TransactionType::Install),
            "update" => Ok(TransactionType::Update),
            "configure" => Ok(TransactionType::Configure),
            "remove" => Ok(TransactionType::Remove),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub pkgname: String,
    pub version: String,
    /// `pkgname-version` composite
    pub pkgver: String,
    /// Binary package file name inside its repository
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_desc: Option<String>,
    /// Virtual packages this package satisfies (`name` or `name-version`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    /// Location of the repository the record was resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionType>,
    /// Keep files of the previous version on update
    #[serde(default)]
    pub preserve: bool,
    #[serde(default)]
    pub automatic_install: bool,
}

impl PackageRecord {
    /// Create a record with the required fields
    pub fn new(pkgname: &str, version: &str, filename: &str) -> Self {
        Self {
            pkgname: pkgname.to_string(),
            version: version.to_string(),
            pkgver: format!("{}-{}", pkgname, version),
            filename: filename.to_string(),
            short_desc: None,
            provides: Vec::new(),
            repository: None,
            transaction: None,
            preserve: false,
            automatic_install: false,
        }
    }

    /// Build a record for a local binary package from its properties
    pub fn from_props(props: &PackageProps, filename: &str) -> Self {
        let mut record = Self::new(&props.pkgname, &props.version, filename);
        record.short_desc = props.short_desc.clone();
        record.provides = props.provides.clone();
        record.preserve = props.preserve;
        record
    }

    /// True when the record replaces an installed version
    pub fn is_update(&self) -> bool {
        self.transaction == Some(TransactionType::Update)
    }

    /// True when this package declares it satisfies `virtual_name`
    pub fn provides_name(&self, virtual_name: &str) -> bool {
        self.provides.iter().any(|p| {
            p == virtual_name || crate::version::pkg_name(p) == Some(virtual_name)
        })
    }

    /// True when a provided virtual pkgver matches `pattern`
    pub fn provides_pattern(&self, pattern: &str) -> bool {
        self.provides
            .iter()
            .any(|p| crate::version::pkgpattern_match(p, pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = PackageRecord::new("foo", "1.0_1", "foo-1.0_1.x86_64.pkg");
        assert_eq!(record.pkgver, "foo-1.0_1");
        assert!(!record.is_update());
        assert!(!record.preserve);
    }

    #[test]
    fn test_transaction_type_roundtrip_names() {
        for t in ["install", "update", "configure", "remove"] {
            assert_eq!(TransactionType::from_str(t).unwrap().as_str(), t);
        }
        assert!(TransactionType::from_str("purge").is_err());
    }

    #[test]
    fn test_provides_lookup() {
        let mut record = PackageRecord::new("nano", "2.2_1", "nano-2.2_1.pkg");
        record.provides = vec!["editor".to_string(), "text-editor-1.0_1".to_string()];

        assert!(record.provides_name("editor"));
        assert!(record.provides_name("text-editor"));
        assert!(!record.provides_name("mail-client"));
        assert!(record.provides_pattern("text-editor>=1.0"));
        assert!(!record.provides_pattern("text-editor>=2.0"));
    }

    #[test]
    fn test_record_json_fields() {
        let json = r#"{
            "pkgname": "foo",
            "version": "1.0_1",
            "pkgver": "foo-1.0_1",
            "filename": "foo-1.0_1.pkg",
            "transaction": "update",
            "preserve": true
        }"#;
        let record: PackageRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_update());
        assert!(record.preserve);
        assert!(record.repository.is_none());
    }
}
