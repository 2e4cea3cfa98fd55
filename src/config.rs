// src/config.rs

//! Engine configuration
//!
//! Typed settings consumed across the engine, plus a free-form option map
//! for callers that configure by name. Validation happens once, in
//! `Base::setup`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
pub const MAX_RETRIES: u32 = 3;

/// Engine configuration owned by a `Base`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the installed-package database.
    pub db_path: PathBuf,
    /// Directory where downloaded artifacts are cached.
    pub cache_dir: PathBuf,
    /// Root the free-space check probes before a commit.
    pub install_root: PathBuf,
    /// Native architecture; repositories may also carry `noarch` packages.
    pub arch: String,
    /// Global verification gate; a repository can opt out individually.
    pub gpg_check: bool,
    pub http_timeout: Duration,
    pub max_retries: u32,
    options: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/cairn/cairn.db"),
            cache_dir: PathBuf::from("/var/cache/cairn/packages"),
            install_root: PathBuf::from("/"),
            arch: std::env::consts::ARCH.to_string(),
            gpg_check: true,
            http_timeout: HTTP_TIMEOUT,
            max_retries: MAX_RETRIES,
            options: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Configuration rooted under a single directory, used by the CLI and
    /// convenient in tests.
    pub fn with_root_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            db_path: dir.join("cairn.db"),
            cache_dir: dir.join("cache"),
            install_root: dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Set an option by name. Known names update their typed field; unknown
    /// names are kept in the option map untouched.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "option name must not be empty".to_string(),
            ));
        }

        match name {
            "db_path" => self.db_path = PathBuf::from(value),
            "cache_dir" => self.cache_dir = PathBuf::from(value),
            "install_root" => self.install_root = PathBuf::from(value),
            "arch" => self.arch = value.to_string(),
            "gpgcheck" => {
                self.gpg_check = parse_bool(value).ok_or_else(|| {
                    Error::InvalidArgument(format!("gpgcheck must be a boolean, got '{}'", value))
                })?;
            }
            "http_timeout" => {
                let secs: u64 = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!(
                        "http_timeout must be seconds, got '{}'",
                        value
                    ))
                })?;
                self.http_timeout = Duration::from_secs(secs);
            }
            "max_retries" => {
                self.max_retries = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("max_retries must be a count, got '{}'", value))
                })?;
            }
            _ => {}
        }

        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|s| s.as_str())
    }

    /// Lock file guarding the commit stage, next to the database.
    pub fn lock_path(&self) -> PathBuf {
        match self.db_path.parent() {
            Some(parent) => parent.join("cairn.lock"),
            None => PathBuf::from("cairn.lock"),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::Setup("db_path must not be empty".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Setup("cache_dir must not be empty".to_string()));
        }
        if self.arch.is_empty() {
            return Err(Error::Setup("arch must not be empty".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Setup("max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
