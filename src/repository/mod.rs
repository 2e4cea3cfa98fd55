// src/repository/mod.rs

//! Repository handles
//!
//! A `RepositoryHandle` represents one configured repository and owns its
//! metadata-loading lifecycle:
//!
//! ```text
//! Created -> Configured (baseurl set) -> Enabled -> Loaded
//! ```
//!
//! Loading is all-or-nothing: either the full package list is parsed and
//! swapped in, or the repository stays `Enabled` and the failure is
//! reported. Loading an already-loaded repository is a no-op; a refresh
//! must be requested explicitly.

pub mod download;
pub mod fetcher;
pub mod parsers;

use crate::error::{Error, Result};
use crate::package::PackageRecord;
use chrono::{DateTime, Utc};
use fetcher::MetadataFetcher;
use tracing::{debug, info};

/// Lifecycle state of a repository handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepoState {
    Created,
    Configured,
    Enabled,
    Loaded,
}

/// One configured repository and its loaded package list.
#[derive(Debug)]
pub struct RepositoryHandle {
    id: String,
    baseurl: Option<String>,
    state: RepoState,
    gpg_check: bool,
    priority: i32,
    packages: Vec<PackageRecord>,
    last_refresh: Option<DateTime<Utc>>,
}

impl RepositoryHandle {
    pub(crate) fn new(id: impl Into<String>, gpg_check: bool) -> Self {
        Self {
            id: id.into(),
            baseurl: None,
            state: RepoState::Created,
            gpg_check,
            priority: 0,
            packages: Vec::new(),
            last_refresh: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn baseurl(&self) -> Option<&str> {
        self.baseurl.as_deref()
    }

    pub fn state(&self) -> RepoState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state >= RepoState::Enabled
    }

    pub fn is_loaded(&self) -> bool {
        self.state == RepoState::Loaded
    }

    pub fn gpg_check(&self) -> bool {
        self.gpg_check
    }

    pub fn set_gpg_check(&mut self, gpg_check: bool) {
        self.gpg_check = gpg_check;
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Packages advertised by this repository; empty until loaded.
    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    /// Set or overwrite the base URL. Only valid before `enable`.
    pub fn set_baseurl(&mut self, url: &str) -> Result<()> {
        if self.state >= RepoState::Enabled {
            return Err(Error::State(format!(
                "repository '{}' baseurl may not change after enable",
                self.id
            )));
        }

        validate_baseurl(url)?;
        self.baseurl = Some(url.to_string());
        self.state = RepoState::Configured;
        Ok(())
    }

    /// Transition `Configured -> Enabled`. Idempotent once enabled.
    pub fn enable(&mut self) -> Result<()> {
        match self.state {
            RepoState::Created => Err(Error::State(format!(
                "repository '{}' has no baseurl; set one before enabling",
                self.id
            ))),
            RepoState::Configured => {
                self.state = RepoState::Enabled;
                debug!("Repository '{}' enabled", self.id);
                Ok(())
            }
            RepoState::Enabled | RepoState::Loaded => Ok(()),
        }
    }

    /// Fetch and parse this repository's metadata.
    ///
    /// No-op success when already loaded. On failure the handle stays
    /// `Enabled` with no packages: a repository is never half-loaded.
    pub fn load(&mut self, fetcher: &dyn MetadataFetcher) -> Result<()> {
        match self.state {
            RepoState::Created | RepoState::Configured => {
                return Err(Error::State(format!(
                    "repository '{}' must be enabled before loading",
                    self.id
                )));
            }
            RepoState::Loaded => {
                debug!("Repository '{}' already loaded, skipping", self.id);
                return Ok(());
            }
            RepoState::Enabled => {}
        }

        let baseurl = self.baseurl.as_deref().ok_or_else(|| {
            Error::State(format!("repository '{}' has no baseurl", self.id))
        })?;

        let metadata = fetcher
            .fetch(&self.id, baseurl)
            .map_err(|e| Error::Repo {
                repo_id: self.id.clone(),
                reason: e.to_string(),
            })?;

        // Convert everything before touching self so a bad entry cannot
        // leave a partial package list behind.
        let packages = metadata
            .into_iter()
            .map(|meta| meta.into_record(&self.id))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::Repo {
                repo_id: self.id.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Repository '{}' loaded: {} packages",
            self.id,
            packages.len()
        );
        self.packages = packages;
        self.last_refresh = Some(Utc::now());
        self.state = RepoState::Loaded;
        Ok(())
    }

    /// Explicitly re-fetch metadata, replacing the loaded package list.
    pub fn reload(&mut self, fetcher: &dyn MetadataFetcher) -> Result<()> {
        if self.state == RepoState::Loaded {
            self.state = RepoState::Enabled;
            self.packages.clear();
        }
        self.load(fetcher)
    }
}

fn validate_baseurl(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::InvalidUrl("baseurl must not be empty".to_string()));
    }

    let supported = url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("file://")
        || std::path::Path::new(url).is_absolute();
    if !supported {
        return Err(Error::InvalidUrl(format!(
            "'{}' is not an http(s), file, or absolute path URL",
            url
        )));
    }

    Ok(())
}
