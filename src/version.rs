// src/version.rs

//! Package version handling
//!
//! Versions are compared with dewey-decimal ordering: numeric components
//! separated by dots, optional pre-release modifiers (`alpha`, `beta`,
//! `pre`, `rc`), patch levels (`pl`), trailing letters and a `_N`
//! package revision that is compared last.
//!
//! A `pkgver` is the `name-version` composite, e.g. `foo-1.2.3_1`.

use glob::Pattern;
use std::cmp::Ordering;

const DEWEY_ALPHA: i64 = -3;
const DEWEY_BETA: i64 = -2;
const DEWEY_RC: i64 = -1;
const DEWEY_PATCHLEVEL: i64 = 0;

const MODIFIERS: &[(&str, i64)] = &[
    ("alpha", DEWEY_ALPHA),
    ("beta", DEWEY_BETA),
    ("pre", DEWEY_RC),
    ("rc", DEWEY_RC),
    ("pl", DEWEY_PATCHLEVEL),
];

/// Total order over version strings
pub trait VersionComparator {
    /// True when `candidate` is strictly newer than `current`
    fn is_newer(&self, candidate: &str, current: &str) -> bool;
}

/// Dewey-decimal version comparator
#[derive(Debug, Clone, Copy, Default)]
pub struct Dewey;

impl VersionComparator for Dewey {
    fn is_newer(&self, candidate: &str, current: &str) -> bool {
        cmpver(candidate, current) == Ordering::Greater
    }
}

/// Parsed dewey version: components plus package revision
#[derive(Debug, Default, PartialEq, Eq)]
struct DeweyVersion {
    components: Vec<i64>,
    revision: i64,
}

impl DeweyVersion {
    fn parse(version: &str) -> Self {
        let mut parsed = DeweyVersion::default();
        let bytes = version.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let c = bytes[i];
            if c == b'_' {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                parsed.revision = version[start..i].parse().unwrap_or(0);
            } else if c.is_ascii_digit() {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                parsed.components.push(version[start..i].parse().unwrap_or(i64::MAX));
            } else if let Some((name, value)) = MODIFIERS
                .iter()
                .find(|(name, _)| bytes[i..].starts_with(name.as_bytes()))
            {
                parsed.components.push(*value);
                i += name.len();
            } else if c.is_ascii_alphabetic() {
                // "1.0a" sorts as 1.0.0.1
                parsed.components.push(0);
                parsed
                    .components
                    .push(i64::from(c.to_ascii_lowercase() - b'a') + 1);
                i += 1;
            } else {
                i += 1;
            }
        }

        parsed
    }

    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for idx in 0..len {
            let a = self.components.get(idx).copied().unwrap_or(0);
            let b = other.components.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.revision.cmp(&other.revision)
    }
}

/// Compare two versions (or two pkgvers of the same package)
///
/// When both arguments are pkgvers the name part is stripped before
/// comparison.
pub fn cmpver(a: &str, b: &str) -> Ordering {
    let a = pkg_version(a).unwrap_or(a);
    let b = pkg_version(b).unwrap_or(b);
    DeweyVersion::parse(a).cmp(&DeweyVersion::parse(b))
}

/// Split point of a pkgver: the last `-` followed by a digit
fn version_split(pkgver: &str) -> Option<usize> {
    let idx = pkgver.rfind('-')?;
    let rest = &pkgver[idx + 1..];
    if idx == 0 || !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(idx)
}

/// Name part of a pkgver (`foo-1.0_1` → `foo`)
pub fn pkg_name(pkgver: &str) -> Option<&str> {
    version_split(pkgver).map(|idx| &pkgver[..idx])
}

/// Version part of a pkgver (`foo-1.0_1` → `1.0_1`)
pub fn pkg_version(pkgver: &str) -> Option<&str> {
    version_split(pkgver).map(|idx| &pkgver[idx + 1..])
}

/// Name part of a pattern (`foo>=1.0` → `foo`, `foo-1.*` → `foo`)
pub fn pkgpattern_name(pattern: &str) -> Option<&str> {
    if let Some(idx) = pattern.find(['<', '>']) {
        return Some(&pattern[..idx]);
    }
    let idx = pattern.rfind('-')?;
    (idx > 0).then(|| &pattern[..idx])
}

/// Match a pkgver against a package pattern
///
/// Supports dewey ranges (`foo>=1.0`, `foo>1.0<2.0`), shell globs over the
/// whole pkgver (`foo-1.[0-9]*`) and exact pkgvers.
pub fn pkgpattern_match(pkgver: &str, pattern: &str) -> bool {
    if pattern.contains(['<', '>']) {
        return dewey_match(pkgver, pattern);
    }
    if pattern.contains(['*', '?', '[']) {
        return match Pattern::new(pattern) {
            Ok(glob) => glob.matches(pkgver),
            Err(_) => false,
        };
    }
    pkgver == pattern
}

fn dewey_match(pkgver: &str, pattern: &str) -> bool {
    let (Some(name), Some(version)) = (pkg_name(pkgver), pkg_version(pkgver)) else {
        return false;
    };
    let Some(op_start) = pattern.find(['<', '>']) else {
        return false;
    };
    if &pattern[..op_start] != name {
        return false;
    }

    let mut rest = &pattern[op_start..];
    while !rest.is_empty() {
        let (op, after) = if let Some(r) = rest.strip_prefix(">=") {
            (">=", r)
        } else if let Some(r) = rest.strip_prefix("<=") {
            ("<=", r)
        } else if let Some(r) = rest.strip_prefix('>') {
            (">", r)
        } else if let Some(r) = rest.strip_prefix('<') {
            ("<", r)
        } else {
            return false;
        };
        let end = after.find(['<', '>']).unwrap_or(after.len());
        let bound = &after[..end];
        rest = &after[end..];

        let ord = DeweyVersion::parse(version).cmp(&DeweyVersion::parse(bound));
        let ok = match op {
            ">=" => ord != Ordering::Less,
            "<=" => ord != Ordering::Greater,
            ">" => ord == Ordering::Greater,
            _ => ord == Ordering::Less,
        };
        if !ok {
            return false;
        }
    }
    true
}
