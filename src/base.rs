// src/base.rs

//! Base context
//!
//! A `Base` is the process-scoped root of the engine: it owns the
//! configuration, the repository set, the installed-package index, and the
//! collaborator implementations (metadata fetcher, artifact fetcher,
//! resolver). Queries and transactions borrow the `Base` that created them,
//! so no handle can outlive it; dropping the `Base` releases everything it
//! owns.
//!
//! Lifecycle: `setup` exactly once, then repositories may be added and
//! `load_repos` run; queries and transactions become available once
//! repository loading has completed (even trivially, with zero
//! repositories).

use crate::config::Config;
use crate::db;
use crate::db::models::InstalledPackage;
use crate::error::{Error, RepoFailure, Result};
use crate::package::PackageRecord;
use crate::query::Query;
use crate::repository::RepositoryHandle;
use crate::repository::download::{ArtifactFetcher, HttpArtifactFetcher};
use crate::repository::fetcher::{HttpMetadataFetcher, MetadataFetcher};
use crate::resolver::{ClosureResolver, DependencyResolver, ResolverContext};
use crate::transaction::Transaction;
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Process-scoped engine context. See the module docs for the lifecycle.
pub struct Base {
    config: Config,
    setup_done: bool,
    repos_loaded: bool,
    repos: Vec<RepositoryHandle>,
    installed: Vec<PackageRecord>,
    conn: Option<Connection>,
    metadata_fetcher: Option<Box<dyn MetadataFetcher>>,
    artifact_fetcher: Option<Box<dyn ArtifactFetcher>>,
    resolver: Box<dyn DependencyResolver>,
}

impl Base {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            setup_done: false,
            repos_loaded: false,
            repos: Vec::new(),
            installed: Vec::new(),
            conn: None,
            metadata_fetcher: None,
            artifact_fetcher: None,
            resolver: Box::new(ClosureResolver),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the metadata fetch service. Only meaningful before
    /// `load_repos`.
    pub fn set_metadata_fetcher(&mut self, fetcher: Box<dyn MetadataFetcher>) {
        self.metadata_fetcher = Some(fetcher);
    }

    /// Replace the artifact fetch service. Only meaningful before
    /// `Transaction::download`.
    pub fn set_artifact_fetcher(&mut self, fetcher: Box<dyn ArtifactFetcher>) {
        self.artifact_fetcher = Some(fetcher);
    }

    /// Replace the dependency resolver.
    pub fn set_resolver(&mut self, resolver: Box<dyn DependencyResolver>) {
        self.resolver = resolver;
    }

    /// Initialize the engine: validate configuration, open the package
    /// database, build default collaborators, and read the installed index.
    ///
    /// Must be called exactly once before any other operation.
    pub fn setup(&mut self) -> Result<()> {
        if self.setup_done {
            return Err(Error::Setup("setup may only be called once".to_string()));
        }
        self.config.validate()?;

        let conn = db::init(&self.config.db_path)?;
        std::fs::create_dir_all(&self.config.cache_dir).map_err(|e| {
            Error::Setup(format!(
                "failed to create cache directory {}: {}",
                self.config.cache_dir.display(),
                e
            ))
        })?;

        if self.metadata_fetcher.is_none() {
            self.metadata_fetcher = Some(Box::new(HttpMetadataFetcher::new(
                self.config.http_timeout,
                self.config.max_retries,
            )?));
        }
        if self.artifact_fetcher.is_none() {
            self.artifact_fetcher = Some(Box::new(HttpArtifactFetcher::new(
                self.config.http_timeout,
                self.config.max_retries,
            )?));
        }

        self.installed = read_installed(&conn)?;
        self.conn = Some(conn);
        self.setup_done = true;

        info!(
            "Base ready: {} installed package(s), database at {}",
            self.installed.len(),
            self.config.db_path.display()
        );
        Ok(())
    }

    /// Add a repository handle with a unique id. Valid only after `setup`.
    pub fn add_repo(&mut self, id: &str) -> Result<&mut RepositoryHandle> {
        if !self.setup_done {
            return Err(Error::State(
                "repositories may only be added after setup".to_string(),
            ));
        }
        if id.is_empty() {
            return Err(Error::InvalidArgument(
                "repository id must not be empty".to_string(),
            ));
        }
        if self.repos.iter().any(|r| r.id() == id) {
            return Err(Error::InvalidArgument(format!(
                "repository '{}' already exists",
                id
            )));
        }

        self.repos
            .push(RepositoryHandle::new(id, self.config.gpg_check));
        debug!("Added repository '{}'", id);
        Ok(self.repos.last_mut().expect("just pushed"))
    }

    pub fn repos(&self) -> &[RepositoryHandle] {
        &self.repos
    }

    pub fn repo(&self, id: &str) -> Option<&RepositoryHandle> {
        self.repos.iter().find(|r| r.id() == id)
    }

    pub fn repo_mut(&mut self, id: &str) -> Option<&mut RepositoryHandle> {
        self.repos.iter_mut().find(|r| r.id() == id)
    }

    /// Load every enabled repository, best-effort.
    ///
    /// One failing repository does not block the others: all failures are
    /// aggregated into a single `RepoLoad` error naming each one, and the
    /// repositories that did load stay usable. With zero repositories this
    /// succeeds trivially. Also refreshes the installed index.
    pub fn load_repos(&mut self) -> Result<()> {
        if !self.setup_done {
            return Err(Error::State(
                "load_repos requires a completed setup".to_string(),
            ));
        }

        let fetcher = self
            .metadata_fetcher
            .as_deref()
            .ok_or_else(|| Error::State("no metadata fetcher configured".to_string()))?;

        let mut failures: Vec<RepoFailure> = Vec::new();
        for repo in &mut self.repos {
            if !repo.is_enabled() {
                debug!("Skipping repository '{}': not enabled", repo.id());
                continue;
            }
            if let Err(e) = repo.load(fetcher) {
                warn!("Repository '{}' failed to load: {}", repo.id(), e);
                failures.push(RepoFailure {
                    repo_id: repo.id().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        self.repos_loaded = true;
        self.refresh_installed()?;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::RepoLoad { failures })
        }
    }

    /// Re-read the installed index from the package database, e.g. after a
    /// committed transaction.
    pub fn refresh_installed(&mut self) -> Result<()> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| Error::State("setup has not completed".to_string()))?;
        self.installed = read_installed(conn)?;
        Ok(())
    }

    /// Installed-package index as of the last refresh.
    pub fn installed_packages(&self) -> &[PackageRecord] {
        &self.installed
    }

    /// Start a query over the combined installed and repository indices.
    pub fn query(&self) -> Result<Query<'_>> {
        self.ensure_ready("queries")?;
        Ok(Query::new(self))
    }

    /// Start an empty transaction.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.ensure_ready("transactions")?;
        Ok(Transaction::new(self))
    }

    fn ensure_ready(&self, what: &str) -> Result<()> {
        if !self.setup_done {
            return Err(Error::State(format!(
                "{} require a completed setup",
                what
            )));
        }
        if !self.repos_loaded {
            return Err(Error::State(format!(
                "{} require load_repos to have completed",
                what
            )));
        }
        Ok(())
    }

    /// The full package universe: installed first, then each loaded
    /// repository in configuration order.
    pub(crate) fn universe(&self) -> impl Iterator<Item = &PackageRecord> + '_ {
        self.installed.iter().chain(
            self.repos
                .iter()
                .filter(|r| r.is_loaded())
                .flat_map(|r| r.packages().iter()),
        )
    }

    pub(crate) fn resolver_context(&self) -> ResolverContext<'_> {
        ResolverContext {
            installed: self.installed.iter().collect(),
            available: self
                .repos
                .iter()
                .filter(|r| r.is_loaded())
                .flat_map(|r| r.packages().iter())
                .collect(),
        }
    }

    pub(crate) fn resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    pub(crate) fn artifact_fetcher(&self) -> Result<&dyn ArtifactFetcher> {
        self.artifact_fetcher
            .as_deref()
            .ok_or_else(|| Error::State("no artifact fetcher configured".to_string()))
    }

    pub(crate) fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::State("setup has not completed".to_string()))
    }
}

fn read_installed(conn: &Connection) -> Result<Vec<PackageRecord>> {
    Ok(InstalledPackage::list_all(conn)?
        .iter()
        .map(InstalledPackage::to_record)
        .collect())
}
