// src/repository/parsers/mod.rs

//! Repository metadata parsers
//!
//! Parsers for the on-the-wire metadata formats a repository may serve:
//! - JSON package index (`metadata.json`)
//! - RPM-MD (`repodata/repomd.xml` + compressed `primary.xml`)
//!
//! Both produce the same `PackageMetadata` shape, which converts into
//! engine package records.

pub mod index;
pub mod rpmmd;

use crate::error::Result;
use crate::package::{Origin, PackageRecord};
use crate::version::{Evr, Requirement};

/// Package metadata extracted from repository metadata, format-independent.
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Version string in `epoch:version-release` form
    pub version: String,

    /// Architecture (x86_64, aarch64, noarch, ...)
    pub arch: Option<String>,

    /// Short package description
    pub summary: Option<String>,

    /// Hex SHA-256 of the package artifact
    pub checksum: Option<String>,

    /// Compressed package size in bytes
    pub download_size: u64,

    /// Installed size in bytes
    pub install_size: u64,

    /// Artifact path relative to the repository base URL
    pub location: String,

    /// Dependency specs, e.g. `libfoo >= 1.2`
    pub requires: Vec<String>,
}

impl PackageMetadata {
    /// Convert into an engine package record attributed to `repo_id`.
    pub fn into_record(self, repo_id: &str) -> Result<PackageRecord> {
        let evr = Evr::parse(&self.version)?;
        let requires = self
            .requires
            .iter()
            .map(|spec| Requirement::parse(spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(PackageRecord {
            name: self.name,
            evr,
            arch: self.arch.unwrap_or_else(|| "noarch".to_string()),
            summary: self.summary.unwrap_or_default(),
            download_size: self.download_size,
            install_size: self.install_size,
            requires,
            checksum: self.checksum,
            location: Some(self.location),
            origin: Origin::Repository(repo_id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_record() {
        let meta = PackageMetadata {
            name: "curl".to_string(),
            version: "1:8.0.1-2.fc43".to_string(),
            arch: Some("x86_64".to_string()),
            summary: Some("Command line tool for transferring data".to_string()),
            checksum: Some("abc123".to_string()),
            download_size: 350_000,
            install_size: 800_000,
            location: "Packages/c/curl-8.0.1-2.fc43.x86_64.rpm".to_string(),
            requires: vec!["libcurl >= 8.0.1".to_string(), "glibc".to_string()],
        };

        let record = meta.into_record("base").unwrap();
        assert_eq!(record.name(), "curl");
        assert_eq!(record.version().epoch, 1);
        assert_eq!(record.arch(), "x86_64");
        assert_eq!(record.requires().len(), 2);
        assert!(!record.is_installed());
        assert_eq!(record.nevra(), "curl-1:8.0.1-2.fc43.x86_64");
    }

    #[test]
    fn test_into_record_defaults_arch_to_noarch() {
        let meta = PackageMetadata {
            name: "tzdata".to_string(),
            version: "2026a-1".to_string(),
            arch: None,
            summary: None,
            checksum: None,
            download_size: 0,
            install_size: 0,
            location: "tzdata-2026a-1.rpm".to_string(),
            requires: Vec::new(),
        };

        let record = meta.into_record("base").unwrap();
        assert_eq!(record.arch(), "noarch");
        assert_eq!(record.summary(), "");
    }

    #[test]
    fn test_into_record_rejects_bad_version() {
        let meta = PackageMetadata {
            name: "bad".to_string(),
            version: "x:not-a-version".to_string(),
            arch: None,
            summary: None,
            checksum: None,
            download_size: 0,
            install_size: 0,
            location: "bad.rpm".to_string(),
            requires: Vec::new(),
        };

        assert!(meta.into_record("base").is_err());
    }
}
