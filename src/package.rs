// src/package.rs

//! Immutable package records
//!
//! A `PackageRecord` is a snapshot of one package as seen in a repository
//! index or in the installed-package database. Records are owned by the
//! `Base` that produced them; queries and transactions hand out borrows
//! (or clone small snapshots) rather than taking ownership.

use crate::version::{Evr, Requirement};
use std::fmt;

/// Where a package record was observed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    /// Present in the installed-package database.
    System,
    /// Advertised by the repository with this id.
    Repository(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::System => write!(f, "@System"),
            Origin::Repository(id) => write!(f, "{}", id),
        }
    }
}

/// One package. Identity is the (name, version, arch) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub(crate) name: String,
    pub(crate) evr: Evr,
    pub(crate) arch: String,
    pub(crate) summary: String,
    pub(crate) download_size: u64,
    pub(crate) install_size: u64,
    pub(crate) requires: Vec<Requirement>,
    /// Hex SHA-256 of the package artifact, when the source advertises one.
    pub(crate) checksum: Option<String>,
    /// Artifact path relative to the repository base URL.
    pub(crate) location: Option<String>,
    pub(crate) origin: Origin,
}

impl PackageRecord {
    /// Minimal record; the remaining fields start empty.
    pub fn new(name: impl Into<String>, evr: Evr, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evr,
            arch: arch.into(),
            summary: String::new(),
            download_size: 0,
            install_size: 0,
            requires: Vec::new(),
            checksum: None,
            location: None,
            origin: Origin::System,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Evr {
        &self.evr
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn download_size(&self) -> u64 {
        self.download_size
    }

    pub fn install_size(&self) -> u64 {
        self.install_size
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_installed(&self) -> bool {
        self.origin == Origin::System
    }

    /// `name-epoch:version-release.arch`, the canonical display form.
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.evr, self.arch)
    }

    /// Same (name, version, arch) identity, regardless of origin.
    pub fn same_identity(&self, other: &PackageRecord) -> bool {
        self.name == other.name && self.evr == other.evr && self.arch == other.arch
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra())
    }
}
