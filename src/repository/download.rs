// src/repository/download.rs

//! Artifact fetch service
//!
//! The `ArtifactFetcher` trait is the engine's boundary to package artifact
//! acquisition. The default implementation downloads over blocking HTTP with
//! retry (or copies from local repositories), stages into a temp file, and
//! renames into the cache only after the checksum verifies. An artifact
//! already present with a matching checksum is reused, which is what makes
//! repeated `download` calls cheap.

use super::fetcher::local_root;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Fetches one package artifact to a destination path.
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch `url` into `dest`. When `checksum` is given the written file
    /// must match it; a pre-existing matching file short-circuits the fetch.
    fn fetch(&self, url: &str, checksum: Option<&str>, dest: &Path) -> Result<()>;
}

/// Default artifact fetcher: HTTP(S) with retry, plus local repositories.
pub struct HttpArtifactFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpArtifactFetcher {
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

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Parse(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
                    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
                    io::copy(&mut response, temp.as_file_mut())?;
                    temp.persist(dest).map_err(|e| {
                        Error::Io(io::Error::other(format!(
                            "failed to move artifact into place: {}",
                            e
                        )))
                    })?;

                    info!("Downloaded {} to {}", url, dest.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Parse(format!(
                            "failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch(&self, url: &str, checksum: Option<&str>, dest: &Path) -> Result<()> {
        if let Some(expected) = checksum {
            if artifact_is_valid(dest, expected)? {
                debug!("Artifact already cached at {}", dest.display());
                return Ok(());
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match local_root(url) {
            Some(source) => {
                if !source.exists() {
                    return Err(Error::Parse(format!(
                        "artifact not found at {}",
                        source.display()
                    )));
                }
                let parent = dest.parent().unwrap_or_else(|| Path::new("."));
                let temp = tempfile::NamedTempFile::new_in(parent)?;
                std::fs::copy(&source, temp.path())?;
                temp.persist(dest).map_err(|e| {
                    Error::Io(io::Error::other(format!(
                        "failed to move artifact into place: {}",
                        e
                    )))
                })?;
            }
            None => self.download(url, dest)?,
        }

        if let Some(expected) = checksum {
            let actual = file_sha256(dest)?;
            if actual != expected {
                std::fs::remove_file(dest).ok();
                return Err(Error::Parse(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
            debug!("Checksum verified for {}", dest.display());
        }

        Ok(())
    }
}

/// Hex SHA-256 digest of a file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether `path` exists and matches the expected digest.
pub fn artifact_is_valid(path: &Path, expected: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    Ok(file_sha256(path)? == expected)
}
