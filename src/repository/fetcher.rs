// src/repository/fetcher.rs

//! Metadata fetch service
//!
//! The `MetadataFetcher` trait is the engine's boundary to repository
//! metadata acquisition. The default implementation speaks blocking HTTP
//! with bounded retry and also serves local directories (plain paths or
//! `file://` URLs), which keeps tests hermetic.
//!
//! Format negotiation probes `metadata.json` first, then falls back to
//! RPM-MD (`repodata/repomd.xml`).

use super::parsers::{self, PackageMetadata};
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Fetches and parses repository metadata into package entries.
pub trait MetadataFetcher: Send + Sync {
    fn fetch(&self, repo_id: &str, baseurl: &str) -> Result<Vec<PackageMetadata>>;
}

/// Default metadata fetcher: HTTP(S) with retry, plus local directories.
pub struct HttpMetadataFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Setup(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    /// GET a URL with retry; Ok(None) means the resource does not exist.
    fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !response.status().is_success() {
                        return Err(Error::Parse(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    let bytes = response
                        .bytes()
                        .map_err(|e| Error::Parse(format!("failed to read {}: {}", url, e)))?;
                    return Ok(Some(bytes.to_vec()));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Parse(format!(
                            "failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    fn read_source(&self, baseurl: &str, rel: &str) -> Result<Option<Vec<u8>>> {
        match local_root(baseurl) {
            Some(root) => {
                let path = root.join(rel);
                if !path.exists() {
                    return Ok(None);
                }
                Ok(Some(std::fs::read(&path)?))
            }
            None => {
                let url = format!("{}/{}", baseurl.trim_end_matches('/'), rel);
                self.get_bytes(&url)
            }
        }
    }
}

impl MetadataFetcher for HttpMetadataFetcher {
    fn fetch(&self, repo_id: &str, baseurl: &str) -> Result<Vec<PackageMetadata>> {
        debug!("Fetching metadata for repository '{}' from {}", repo_id, baseurl);

        // JSON index first
        if let Some(bytes) = self.read_source(baseurl, "metadata.json")? {
            let packages = parsers::index::parse_index(&bytes)?;
            info!(
                "Fetched JSON index for '{}': {} packages",
                repo_id,
                packages.len()
            );
            return Ok(packages);
        }

        // RPM-MD fallback
        if let Some(bytes) = self.read_source(baseurl, "repodata/repomd.xml")? {
            let repomd = String::from_utf8(bytes)
                .map_err(|e| Error::Parse(format!("invalid UTF-8 in repomd.xml: {}", e)))?;
            let location = parsers::rpmmd::parse_repomd(&repomd)?;
            let primary_bytes = self.read_source(baseurl, &location)?.ok_or_else(|| {
                Error::Parse(format!("primary metadata missing at {}", location))
            })?;
            let primary = parsers::rpmmd::decompress_primary(&location, &primary_bytes)?;
            let packages = parsers::rpmmd::parse_primary(&primary)?;
            info!(
                "Fetched RPM-MD metadata for '{}': {} packages",
                repo_id,
                packages.len()
            );
            return Ok(packages);
        }

        Err(Error::Parse(format!(
            "no metadata.json or repodata/repomd.xml under {}",
            baseurl
        )))
    }
}

/// Local filesystem root for plain paths and `file://` URLs.
pub(crate) fn local_root(baseurl: &str) -> Option<PathBuf> {
    if let Some(path) = baseurl.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if Path::new(baseurl).is_absolute() {
        Some(PathBuf::from(baseurl))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> HttpMetadataFetcher {
        HttpMetadataFetcher::new(Duration::from_secs(5), 1).unwrap()
    }

    fn write_index(dir: &Path) {
        std::fs::write(
            dir.join("metadata.json"),
            r#"{
                "name": "test",
                "packages": [
                    {"name": "curl", "version": "8.0.1-2", "arch": "x86_64",
                     "location": "packages/curl.rpm", "download_size": 10}
                ]
            }"#,
        )
        .unwrap();
    }

    #[test]
    fn test_local_root_detection() {
        assert_eq!(
            local_root("file:///srv/repo"),
            Some(PathBuf::from("/srv/repo"))
        );
        assert_eq!(local_root("/srv/repo"), Some(PathBuf::from("/srv/repo")));
        assert_eq!(local_root("https://example.com/repo"), None);
    }

    #[test]
    fn test_fetch_local_json_index() {
        let dir = TempDir::new().unwrap();
        write_index(dir.path());

        let packages = fetcher()
            .fetch("test", dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "curl");
    }

    #[test]
    fn test_fetch_local_file_url() {
        let dir = TempDir::new().unwrap();
        write_index(dir.path());

        let baseurl = format!("file://{}", dir.path().display());
        let packages = fetcher().fetch("test", &baseurl).unwrap();
        assert_eq!(packages.len(), 1);
    }

    #[test]
    fn test_fetch_local_rpmmd_fallback() {
        let dir = TempDir::new().unwrap();
        let repodata = dir.path().join("repodata");
        std::fs::create_dir_all(&repodata).unwrap();

        std::fs::write(
            repodata.join("repomd.xml"),
            r#"<repomd><data type="primary"><location href="repodata/primary.xml"/></data></repomd>"#,
        )
        .unwrap();
        std::fs::write(
            repodata.join("primary.xml"),
            r#"<metadata><package type="rpm">
                <name>vim</name><arch>x86_64</arch>
                <version epoch="0" ver="9.0" rel="1"/>
                <location href="Packages/vim.rpm"/>
               </package></metadata>"#,
        )
        .unwrap();

        let packages = fetcher()
            .fetch("test", dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "vim");
    }

    #[test]
    fn test_fetch_empty_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = fetcher().fetch("test", dir.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_fetch_corrupt_index_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metadata.json"), "{not json").unwrap();

        let result = fetcher().fetch("test", dir.path().to_str().unwrap());
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
