// src/lib.rs

//! Cairn Package Transaction Engine
//!
//! Resolves install/remove/upgrade requests against configured repositories
//! and the installed-package database, then drives the resolved plan through
//! staged execution: resolve -> download -> test -> run.
//!
//! # Architecture
//!
//! - Base: process-scoped context owning configuration, repositories, and
//!   the installed index; every other handle borrows it
//! - Repositories: per-repository metadata lifecycle (configure, enable,
//!   load), all-or-nothing
//! - Queries: deterministic, lazily cached views over the package universe
//! - Transactions: staged execution with retry-in-place download/test and a
//!   changeset-recorded, rollback-safe commit
//! - Collaborators behind traits: metadata fetcher, artifact fetcher, and
//!   dependency resolver are pluggable
//!
//! Handles are single-owner: a Base and the queries, transactions, and
//! repository handles borrowed from it belong to one logical flow of
//! control. Artifact downloads parallelize internally, but that is not
//! observable from the outside beyond failures naming every failed action.

pub mod base;
pub mod config;
pub mod db;
mod error;
pub mod package;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod transaction;
pub mod version;

pub use base::Base;
pub use config::Config;
pub use error::{
    CommitFailure, DownloadFailure, Error, RepoFailure, ResolutionProblems, Result,
    UnmetRequirement,
};
pub use package::{Origin, PackageRecord};
pub use query::Query;
pub use repository::{RepoState, RepositoryHandle};
pub use transaction::{ActionKind, ActionReason, PlannedAction, Transaction, TxnStage};
pub use version::{Evr, Requirement};
