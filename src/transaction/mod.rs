// src/transaction/mod.rs

//! Transaction engine
//!
//! A `Transaction` accumulates requested operations, resolves them into a
//! dependency-consistent plan, and drives the staged execution protocol:
//!
//! ```text
//! Building -> Resolved -> Downloaded -> Tested -> Committed
//!     |           |            |           |
//!     +-----------+------------+-----------+--> Failed
//! ```
//!
//! `resolve` and `run` failures are terminal: they invalidate the
//! transaction object. `download` and `test` failures leave the stage
//! unchanged so the caller can retry in place; a repeated `download` only
//! fetches what is still missing.
//!
//! `run` is the single stage that mutates persistent state. It applies the
//! plan to the package database under the process lock as a recorded
//! changeset, rolling back the applied prefix on failure. Its error payload
//! always distinguishes "nothing applied" from "partially applied".

pub mod lock;

use crate::base::Base;
use crate::db;
use crate::db::models::{Changeset, ChangesetStatus, InstalledPackage};
use crate::error::{CommitFailure, DownloadFailure, Error, Result};
use crate::package::{Origin, PackageRecord};
use crate::repository::download::{ArtifactFetcher as _, artifact_is_valid};
use crate::resolver::DependencyResolver as _;
use lock::TransactionLock;
use rayon::prelude::*;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Execution stage of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStage {
    Building,
    Resolved,
    Downloaded,
    Tested,
    Committed,
    Failed,
}

impl fmt::Display for TxnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxnStage::Building => "building",
            TxnStage::Resolved => "resolved",
            TxnStage::Downloaded => "downloaded",
            TxnStage::Tested => "tested",
            TxnStage::Committed => "committed",
            TxnStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Kind of a requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Remove,
    Upgrade,
}

/// One caller-requested operation.
#[derive(Debug, Clone)]
pub struct RequestedOp {
    pub kind: OperationKind,
    pub target: PackageRecord,
}

/// Why an action entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionReason {
    Requested,
    Dependency,
}

/// Concrete effect of a planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Install,
    Remove,
    Upgrade { replaces: PackageRecord },
}

/// One entry of a resolved plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub kind: ActionKind,
    pub package: PackageRecord,
    pub reason: ActionReason,
}

impl PlannedAction {
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::Install => format!("install {}", self.package.nevra()),
            ActionKind::Remove => format!("remove {}", self.package.nevra()),
            ActionKind::Upgrade { replaces } => {
                format!("upgrade {} to {}", replaces.nevra(), self.package.nevra())
            }
        }
    }

    /// Installs and upgrades need their artifact fetched before commit.
    pub fn needs_artifact(&self) -> bool {
        !matches!(self.kind, ActionKind::Remove)
    }
}

/// What it takes to undo one applied action.
enum Compensation {
    Uninstall(PackageRecord),
    Reinstall(PackageRecord),
    DowngradeTo {
        old: PackageRecord,
        new: PackageRecord,
    },
}

struct DownloadJob {
    nevra: String,
    url: String,
    checksum: Option<String>,
    dest: PathBuf,
}

/// A staged package transaction bound to one `Base`.
pub struct Transaction<'base> {
    base: &'base Base,
    stage: TxnStage,
    requested: Vec<RequestedOp>,
    plan: Vec<PlannedAction>,
    /// nevra -> fetched artifact path, filled by `download`.
    artifacts: BTreeMap<String, PathBuf>,
}

impl<'base> Transaction<'base> {
    pub(crate) fn new(base: &'base Base) -> Self {
        Self {
            base,
            stage: TxnStage::Building,
            requested: Vec::new(),
            plan: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> TxnStage {
        self.stage
    }

    pub fn requested_ops(&self) -> &[RequestedOp] {
        &self.requested
    }

    /// The resolved plan; empty until `resolve` succeeds.
    pub fn plan(&self) -> &[PlannedAction] {
        &self.plan
    }

    /// Cached artifact path for a planned action, once downloaded.
    pub fn artifact_path(&self, nevra: &str) -> Option<&PathBuf> {
        self.artifacts.get(nevra)
    }

    /// Total bytes to fetch for the plan.
    pub fn download_size(&self) -> u64 {
        self.plan
            .iter()
            .filter(|a| a.needs_artifact())
            .map(|a| a.package.download_size())
            .sum()
    }

    /// Net change in installed bytes the plan would cause.
    pub fn install_size_delta(&self) -> i64 {
        let mut delta: i64 = 0;
        for action in &self.plan {
            match &action.kind {
                ActionKind::Install => {
                    delta = delta.saturating_add(clamp_i64(action.package.install_size()));
                }
                ActionKind::Remove => {
                    delta = delta.saturating_sub(clamp_i64(action.package.install_size()));
                }
                ActionKind::Upgrade { replaces } => {
                    delta = delta
                        .saturating_add(clamp_i64(action.package.install_size()))
                        .saturating_sub(clamp_i64(replaces.install_size()));
                }
            }
        }
        delta
    }

    pub fn add_install(&mut self, pkg: &PackageRecord) -> Result<()> {
        self.push_op(OperationKind::Install, pkg)
    }

    pub fn add_remove(&mut self, pkg: &PackageRecord) -> Result<()> {
        self.push_op(OperationKind::Remove, pkg)
    }

    pub fn add_upgrade(&mut self, pkg: &PackageRecord) -> Result<()> {
        self.push_op(OperationKind::Upgrade, pkg)
    }

    fn push_op(&mut self, kind: OperationKind, pkg: &PackageRecord) -> Result<()> {
        if self.stage != TxnStage::Building {
            return Err(Error::State(format!(
                "operations may not be added in stage '{}'",
                self.stage
            )));
        }
        self.requested.push(RequestedOp {
            kind,
            target: pkg.clone(),
        });
        Ok(())
    }

    /// Compute the dependency closure and produce the ordered plan.
    ///
    /// On failure the transaction is terminally `Failed` and the plan stays
    /// empty.
    pub fn resolve(&mut self) -> Result<()> {
        if self.stage != TxnStage::Building {
            return Err(Error::State(format!(
                "resolve is only valid in stage 'building', not '{}'",
                self.stage
            )));
        }

        let ctx = self.base.resolver_context();
        match self.base.resolver().resolve(&ctx, &self.requested) {
            Ok(plan) => {
                info!(
                    "Resolved {} requested operation(s) into {} action(s)",
                    self.requested.len(),
                    plan.len()
                );
                self.plan = plan;
                self.stage = TxnStage::Resolved;
                Ok(())
            }
            Err(problems) => {
                self.stage = TxnStage::Failed;
                Err(Error::Unresolvable(problems))
            }
        }
    }

    /// Fetch artifacts for every planned install and upgrade.
    ///
    /// Fetches run concurrently; the reported failure names every action
    /// that failed. Already-cached artifacts are left untouched, so a retry
    /// after a partial failure only fetches what is still missing.
    pub fn download(&mut self) -> Result<()> {
        if self.stage != TxnStage::Resolved {
            return Err(Error::State(format!(
                "download is only valid in stage 'resolved', not '{}'",
                self.stage
            )));
        }

        let cache_dir = &self.base.config().cache_dir;
        std::fs::create_dir_all(cache_dir)?;

        let mut failures: Vec<DownloadFailure> = Vec::new();
        let mut jobs: Vec<DownloadJob> = Vec::new();

        for action in self.plan.iter().filter(|a| a.needs_artifact()) {
            let nevra = action.package.nevra();
            match self.artifact_url(&action.package) {
                Ok(url) => {
                    let file_name = artifact_file_name(&action.package);
                    jobs.push(DownloadJob {
                        nevra,
                        url,
                        checksum: action.package.checksum().map(|s| s.to_string()),
                        dest: cache_dir.join(file_name),
                    });
                }
                Err(reason) => failures.push(DownloadFailure { nevra, reason }),
            }
        }

        let fetcher = self.base.artifact_fetcher()?;
        let results: Vec<(usize, Result<()>)> = jobs
            .par_iter()
            .enumerate()
            .map(|(i, job)| {
                (
                    i,
                    fetcher.fetch(&job.url, job.checksum.as_deref(), &job.dest),
                )
            })
            .collect();

        for (i, outcome) in results {
            let job = &jobs[i];
            match outcome {
                Ok(()) => {
                    self.artifacts.insert(job.nevra.clone(), job.dest.clone());
                }
                Err(e) => failures.push(DownloadFailure {
                    nevra: job.nevra.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            info!("Downloaded {} artifact(s)", self.artifacts.len());
            self.stage = TxnStage::Downloaded;
            Ok(())
        } else {
            failures.sort_by(|a, b| a.nevra.cmp(&b.nevra));
            Err(Error::Download { failures })
        }
    }

    fn artifact_url(&self, pkg: &PackageRecord) -> std::result::Result<String, String> {
        let repo_id = match pkg.origin() {
            Origin::Repository(id) => id,
            Origin::System => {
                return Err("installed packages have no artifact source".to_string());
            }
        };
        let repo = self
            .base
            .repo(repo_id)
            .ok_or_else(|| format!("repository '{}' is not configured", repo_id))?;
        let baseurl = repo
            .baseurl()
            .ok_or_else(|| format!("repository '{}' has no baseurl", repo_id))?;
        let location = pkg
            .location()
            .ok_or_else(|| "package metadata carries no artifact location".to_string())?;
        Ok(format!("{}/{}", baseurl.trim_end_matches('/'), location))
    }

    /// Dry-run verification: artifacts present and verified, enough disk
    /// space, and the package database still in the state the plan assumed.
    ///
    /// Mutates nothing; failure leaves the stage at `Downloaded` so the
    /// caller can re-test after an external fix.
    pub fn test(&mut self) -> Result<()> {
        if self.stage != TxnStage::Downloaded {
            return Err(Error::State(format!(
                "test is only valid in stage 'downloaded', not '{}'",
                self.stage
            )));
        }

        let mut problems: Vec<String> = Vec::new();

        for action in self.plan.iter().filter(|a| a.needs_artifact()) {
            let nevra = action.package.nevra();
            let verification_required = self.verification_required(&action.package);

            let path = match self.artifacts.get(&nevra) {
                Some(path) => path,
                None => {
                    problems.push(format!("artifact for {} was never fetched", nevra));
                    continue;
                }
            };
            if !path.exists() {
                problems.push(format!(
                    "artifact for {} disappeared from {}",
                    nevra,
                    path.display()
                ));
                continue;
            }

            match action.package.checksum() {
                Some(expected) => match artifact_is_valid(path, expected) {
                    Ok(true) => {}
                    Ok(false) => problems.push(format!("checksum mismatch for {}", nevra)),
                    Err(e) => problems.push(format!("cannot verify {}: {}", nevra, e)),
                },
                None if verification_required => {
                    problems.push(format!(
                        "{} carries no checksum but verification is required",
                        nevra
                    ));
                }
                None => {}
            }
        }

        self.check_disk_space(&mut problems);
        if let Err(e) = self.check_database_drift(&mut problems) {
            problems.push(format!("cannot inspect package database: {}", e));
        }

        if problems.is_empty() {
            info!("Transaction test passed for {} action(s)", self.plan.len());
            self.stage = TxnStage::Tested;
            Ok(())
        } else {
            Err(Error::Test { problems })
        }
    }

    fn verification_required(&self, pkg: &PackageRecord) -> bool {
        if !self.base.config().gpg_check {
            return false;
        }
        match pkg.origin() {
            Origin::Repository(id) => self
                .base
                .repo(id)
                .map(|r| r.gpg_check())
                .unwrap_or(true),
            Origin::System => false,
        }
    }

    fn check_disk_space(&self, problems: &mut Vec<String>) {
        let delta = self.install_size_delta();
        if delta <= 0 {
            return;
        }
        match fs2::available_space(&self.base.config().install_root) {
            Ok(available) => {
                if delta as u64 > available {
                    problems.push(format!(
                        "insufficient disk space: need {} bytes, have {} bytes",
                        delta, available
                    ));
                }
            }
            Err(e) => {
                debug!("Skipping free-space check: {}", e);
            }
        }
    }

    /// The plan was computed against a snapshot; verify the database still
    /// matches it.
    fn check_database_drift(&self, problems: &mut Vec<String>) -> Result<()> {
        let conn = self.base.connection()?;

        for action in &self.plan {
            let pkg = &action.package;
            match &action.kind {
                ActionKind::Install => {
                    if find_row(conn, pkg)?.is_some() {
                        problems.push(format!("{} is already installed", pkg.nevra()));
                    }
                }
                ActionKind::Remove => {
                    if find_row(conn, pkg)?.is_none() {
                        problems.push(format!("{} is no longer installed", pkg.nevra()));
                    }
                }
                ActionKind::Upgrade { replaces } => {
                    if find_row(conn, replaces)?.is_none() {
                        problems.push(format!("{} is no longer installed", replaces.nevra()));
                    }
                    if find_row(conn, pkg)?.is_some() {
                        problems.push(format!("{} is already installed", pkg.nevra()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Commit the plan to the package database, in plan order, as a
    /// recorded changeset.
    ///
    /// The single mutating stage. Every action applies in its own database
    /// transaction; on failure the applied prefix is rolled back. The error
    /// payload distinguishes a clean rollback (`NotApplied`) from a
    /// rollback that itself failed (`PartiallyApplied`), in which case the
    /// pending changeset row marks the transaction for manual intervention.
    pub fn run(&mut self) -> Result<()> {
        if self.stage != TxnStage::Tested {
            return Err(Error::State(format!(
                "run is only valid in stage 'tested', not '{}'",
                self.stage
            )));
        }

        // Lock contention is not a commit failure: nothing was attempted,
        // so the stage is left untouched for a later retry.
        let _lock = TransactionLock::acquire(&self.base.config().lock_path())?;

        let conn = match self.base.connection() {
            Ok(conn) => conn,
            Err(e) => {
                self.stage = TxnStage::Failed;
                return Err(Error::Transaction(CommitFailure::NotApplied {
                    reason: e.to_string(),
                }));
            }
        };

        let summary = self
            .plan
            .iter()
            .map(|a| a.describe())
            .collect::<Vec<_>>()
            .join("; ");
        let mut changeset = Changeset::new(summary);
        if let Err(e) = changeset.insert(conn) {
            self.stage = TxnStage::Failed;
            return Err(Error::Transaction(CommitFailure::NotApplied {
                reason: format!("failed to record changeset: {}", e),
            }));
        }
        let changeset_id = changeset.id.unwrap_or_default();

        let plan = self.plan.clone();
        let mut applied: Vec<(String, Compensation)> = Vec::new();
        for action in &plan {
            match apply_action(conn, action, changeset_id) {
                Ok(compensation) => applied.push((action.describe(), compensation)),
                Err(e) => {
                    warn!("Commit failed at '{}': {}", action.describe(), e);
                    return self.roll_back(conn, &mut changeset, applied, e);
                }
            }
        }

        if let Err(e) = changeset.update_status(conn, ChangesetStatus::Applied) {
            // Actions are on disk but the changeset row still says pending.
            self.stage = TxnStage::Failed;
            return Err(Error::Transaction(CommitFailure::PartiallyApplied {
                applied: applied.into_iter().map(|(desc, _)| desc).collect(),
                reason: format!("failed to mark changeset applied: {}", e),
            }));
        }

        info!(
            "Committed changeset {} ({} action(s))",
            changeset_id,
            plan.len()
        );
        self.stage = TxnStage::Committed;
        Ok(())
    }

    fn roll_back(
        &mut self,
        conn: &Connection,
        changeset: &mut Changeset,
        applied: Vec<(String, Compensation)>,
        cause: Error,
    ) -> Result<()> {
        self.stage = TxnStage::Failed;

        let mut still_applied: Vec<String> = Vec::new();
        for (description, compensation) in applied.into_iter().rev() {
            if let Err(e) = undo_action(conn, &compensation) {
                warn!("Rollback of '{}' failed: {}", description, e);
                still_applied.push(description);
            }
        }

        if still_applied.is_empty() {
            // The pending -> rolled_back update is bookkeeping; the system
            // state is already clean either way.
            changeset
                .update_status(conn, ChangesetStatus::RolledBack)
                .ok();
            Err(Error::Transaction(CommitFailure::NotApplied {
                reason: cause.to_string(),
            }))
        } else {
            still_applied.reverse();
            Err(Error::Transaction(CommitFailure::PartiallyApplied {
                applied: still_applied,
                reason: cause.to_string(),
            }))
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}

fn artifact_file_name(pkg: &PackageRecord) -> String {
    pkg.location()
        .and_then(|loc| loc.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("{}.rpm", pkg.nevra()))
}

fn find_row(conn: &Connection, pkg: &PackageRecord) -> Result<Option<InstalledPackage>> {
    InstalledPackage::find_by_nevra(conn, pkg.name(), pkg.version(), pkg.arch())
}

fn apply_action(
    conn: &Connection,
    action: &PlannedAction,
    changeset_id: i64,
) -> Result<Compensation> {
    db::transaction(conn, |tx| match &action.kind {
        ActionKind::Install => {
            InstalledPackage::from_record(&action.package, Some(changeset_id)).insert(tx)?;
            Ok(Compensation::Uninstall(action.package.clone()))
        }
        ActionKind::Remove => {
            let row = find_row(tx, &action.package)?.ok_or_else(|| {
                Error::State(format!("{} vanished before removal", action.package.nevra()))
            })?;
            let record = row.to_record();
            let id = row
                .id
                .ok_or_else(|| Error::State("installed row has no id".to_string()))?;
            InstalledPackage::delete(tx, id)?;
            Ok(Compensation::Reinstall(record))
        }
        ActionKind::Upgrade { replaces } => {
            let row = find_row(tx, replaces)?.ok_or_else(|| {
                Error::State(format!("{} vanished before upgrade", replaces.nevra()))
            })?;
            let old_record = row.to_record();
            let id = row
                .id
                .ok_or_else(|| Error::State("installed row has no id".to_string()))?;
            InstalledPackage::delete(tx, id)?;
            InstalledPackage::from_record(&action.package, Some(changeset_id)).insert(tx)?;
            Ok(Compensation::DowngradeTo {
                old: old_record,
                new: action.package.clone(),
            })
        }
    })
}

fn undo_action(conn: &Connection, compensation: &Compensation) -> Result<()> {
    db::transaction(conn, |tx| match compensation {
        Compensation::Uninstall(pkg) => {
            if let Some(row) = find_row(tx, pkg)? {
                if let Some(id) = row.id {
                    InstalledPackage::delete(tx, id)?;
                }
            }
            Ok(())
        }
        Compensation::Reinstall(pkg) => {
            InstalledPackage::from_record(pkg, None).insert(tx)?;
            Ok(())
        }
        Compensation::DowngradeTo { old, new } => {
            if let Some(row) = find_row(tx, new)? {
                if let Some(id) = row.id {
                    InstalledPackage::delete(tx, id)?;
                }
            }
            InstalledPackage::from_record(old, None).insert(tx)?;
            Ok(())
        }
    })
}
