// src/repository/parsers/index.rs

//! JSON package index parser
//!
//! Parses the `metadata.json` index format: a single document listing every
//! package in the repository with its version, checksum, sizes, artifact
//! location, and dependency specs.

use super::PackageMetadata;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level index document.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<IndexPackage>,
}

/// One package entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub download_size: u64,
    #[serde(default)]
    pub install_size: u64,
    pub location: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Parse a `metadata.json` document into package metadata.
pub fn parse_index(bytes: &[u8]) -> Result<Vec<PackageMetadata>> {
    let index: IndexFile = serde_json::from_slice(bytes)
        .map_err(|e| Error::Parse(format!("failed to parse metadata index: {}", e)))?;

    debug!(
        "Parsed index '{}' with {} packages",
        index.name,
        index.packages.len()
    );

    Ok(index
        .packages
        .into_iter()
        .map(|pkg| PackageMetadata {
            name: pkg.name,
            version: pkg.version,
            arch: pkg.arch,
            summary: pkg.summary,
            checksum: pkg.checksum,
            download_size: pkg.download_size,
            install_size: pkg.install_size,
            location: pkg.location,
            requires: pkg.requires,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        let doc = r#"{
            "name": "base",
            "packages": [
                {
                    "name": "curl",
                    "version": "8.0.1-2",
                    "arch": "x86_64",
                    "summary": "Command line tool for transferring data",
                    "checksum": "abc123",
                    "download_size": 350000,
                    "install_size": 800000,
                    "location": "packages/curl-8.0.1-2.x86_64.rpm",
                    "requires": ["libcurl >= 8.0.1"]
                },
                {
                    "name": "tzdata",
                    "version": "2026a-1",
                    "location": "packages/tzdata-2026a-1.noarch.rpm"
                }
            ]
        }"#;

        let packages = parse_index(doc.as_bytes()).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "curl");
        assert_eq!(packages[0].requires, vec!["libcurl >= 8.0.1".to_string()]);
        assert_eq!(packages[1].name, "tzdata");
        assert!(packages[1].requires.is_empty());
        assert_eq!(packages[1].download_size, 0);
    }

    #[test]
    fn test_parse_index_empty_repository() {
        let doc = r#"{"name": "empty"}"#;
        let packages = parse_index(doc.as_bytes()).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_parse_index_rejects_garbage() {
        assert!(matches!(
            parse_index(b"not json at all"),
            Err(Error::Parse(_))
        ));
        assert!(parse_index(br#"{"packages": []}"#).is_err(), "name is required");
    }
}
