// src/resolver.rs

//! Dependency resolution
//!
//! The `DependencyResolver` trait owns the observable contract of the
//! solving step: every requested operation's effect is honored, the closure
//! added on top is minimal, the result is deterministic (identical inputs
//! produce the identical plan, ordering included), and failure reports the
//! full unmet/conflicting requirement set rather than the first problem.
//!
//! `ClosureResolver` is the default implementation: a greedy dependency
//! closure with stable tie-breaking and topological output ordering.

use crate::error::{ResolutionProblems, UnmetRequirement};
use crate::package::PackageRecord;
use crate::transaction::{ActionKind, ActionReason, OperationKind, PlannedAction, RequestedOp};
use crate::version::Requirement;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// The package universe a resolution runs against.
pub struct ResolverContext<'a> {
    /// Packages currently installed on the system.
    pub installed: Vec<&'a PackageRecord>,
    /// Packages advertised by loaded repositories.
    pub available: Vec<&'a PackageRecord>,
}

/// Computes a dependency-consistent plan from requested operations.
pub trait DependencyResolver: Send + Sync {
    fn resolve(
        &self,
        ctx: &ResolverContext<'_>,
        requested: &[RequestedOp],
    ) -> std::result::Result<Vec<PlannedAction>, ResolutionProblems>;
}

/// Default resolver: deterministic greedy closure.
///
/// Provider selection is highest version first, then architecture, then
/// origin, so identical universes always pick identical candidates.
#[derive(Debug, Default)]
pub struct ClosureResolver;

impl DependencyResolver for ClosureResolver {
    fn resolve(
        &self,
        ctx: &ResolverContext<'_>,
        requested: &[RequestedOp],
    ) -> std::result::Result<Vec<PlannedAction>, ResolutionProblems> {
        let mut resolution = Resolution::new(ctx);

        for op in requested {
            match op.kind {
                OperationKind::Install => {
                    resolution.add_install(&op.target, ActionReason::Requested);
                }
                OperationKind::Remove => resolution.add_remove(&op.target),
                OperationKind::Upgrade => resolution.add_upgrade(&op.target),
            }
        }

        resolution.close_dependencies();
        resolution.check_survivors();

        if !resolution.problems.is_empty() {
            debug!(
                "Resolution failed: {} unmet, {} conflicts",
                resolution.problems.unmet.len(),
                resolution.problems.conflicts.len()
            );
            return Err(resolution.problems);
        }

        Ok(resolution.into_plan())
    }
}

struct InstallEntry {
    record: PackageRecord,
    reason: ActionReason,
    replaces: Option<PackageRecord>,
}

struct Resolution<'a> {
    installed_by_nevra: BTreeMap<String, &'a PackageRecord>,
    installed_by_name: BTreeMap<&'a str, Vec<&'a PackageRecord>>,
    available_by_name: BTreeMap<&'a str, Vec<&'a PackageRecord>>,
    /// nevra -> queued install (or upgrade, when `replaces` is set)
    installs: BTreeMap<String, InstallEntry>,
    /// nevra -> record leaving the system (pure removals and replaced olds)
    removals: BTreeMap<String, PackageRecord>,
    /// nevras of explicitly requested removals
    pure_removes: BTreeSet<String>,
    queue: VecDeque<String>,
    problems: ResolutionProblems,
}

impl<'a> Resolution<'a> {
    fn new(ctx: &ResolverContext<'a>) -> Self {
        let mut installed_by_nevra = BTreeMap::new();
        let mut installed_by_name: BTreeMap<&str, Vec<&PackageRecord>> = BTreeMap::new();
        for rec in ctx.installed.iter().copied() {
            installed_by_nevra.insert(rec.nevra(), rec);
            installed_by_name.entry(rec.name()).or_default().push(rec);
        }

        let mut available_by_name: BTreeMap<&str, Vec<&PackageRecord>> = BTreeMap::new();
        for rec in ctx.available.iter().copied() {
            available_by_name.entry(rec.name()).or_default().push(rec);
        }
        for list in available_by_name.values_mut() {
            list.sort_by(|a, b| {
                b.version()
                    .cmp(a.version())
                    .then_with(|| a.arch().cmp(b.arch()))
                    .then_with(|| a.origin().cmp(b.origin()))
            });
        }
        for list in installed_by_name.values_mut() {
            list.sort_by(|a, b| b.version().cmp(a.version()));
        }

        Self {
            installed_by_nevra,
            installed_by_name,
            available_by_name,
            installs: BTreeMap::new(),
            removals: BTreeMap::new(),
            pure_removes: BTreeSet::new(),
            queue: VecDeque::new(),
            problems: ResolutionProblems::default(),
        }
    }

    /// Best installed version of `name` on `arch` that is not leaving.
    fn surviving_installed(&self, name: &str, arch: &str) -> Option<PackageRecord> {
        self.installed_by_name
            .get(name)?
            .iter()
            .find(|r| r.arch() == arch && !self.removals.contains_key(&r.nevra()))
            .map(|r| (*r).clone())
    }

    fn add_install(&mut self, target: &PackageRecord, reason: ActionReason) {
        let nevra = target.nevra();

        // Goal already met by the system.
        if self.installed_by_nevra.contains_key(&nevra) && !self.removals.contains_key(&nevra) {
            return;
        }

        if let Some(entry) = self.installs.get_mut(&nevra) {
            if reason == ActionReason::Requested {
                entry.reason = ActionReason::Requested;
            }
            return;
        }

        // Two different versions of one package cannot both enter the plan.
        if let Some((other, _)) = self
            .installs
            .iter()
            .find(|(_, e)| e.record.name() == target.name() && e.record.arch() == target.arch())
        {
            self.problems.conflicts.push(format!(
                "conflicting installs for '{}': {} and {}",
                target.name(),
                other,
                nevra
            ));
            return;
        }

        // An older installed version turns the install into an upgrade.
        let mut replaces = None;
        if let Some(existing) = self.surviving_installed(target.name(), target.arch()) {
            if existing.version() >= target.version() {
                match reason {
                    // The system already carries this version or newer.
                    ActionReason::Requested => return,
                    ActionReason::Dependency => {
                        self.problems.conflicts.push(format!(
                            "installed {} is newer than required candidate {}",
                            existing.nevra(),
                            nevra
                        ));
                        return;
                    }
                }
            }
            self.removals.insert(existing.nevra(), existing.clone());
            replaces = Some(existing);
        }

        self.installs.insert(
            nevra.clone(),
            InstallEntry {
                record: target.clone(),
                reason,
                replaces,
            },
        );
        self.queue.push_back(nevra);
    }

    fn add_remove(&mut self, target: &PackageRecord) {
        let nevra = target.nevra();
        match self.installed_by_nevra.get(&nevra) {
            Some(installed) => {
                self.removals.insert(nevra.clone(), (*installed).clone());
                self.pure_removes.insert(nevra);
            }
            None => {
                self.problems.conflicts.push(format!(
                    "cannot remove {}: package is not installed",
                    nevra
                ));
            }
        }
    }

    fn add_upgrade(&mut self, target: &PackageRecord) {
        let old = self.surviving_installed(target.name(), target.arch());
        let old = match old {
            Some(old) => old,
            None => {
                self.problems.conflicts.push(format!(
                    "cannot upgrade {}: package is not installed",
                    target.name()
                ));
                return;
            }
        };

        if self.pure_removes.contains(&old.nevra()) {
            self.problems.conflicts.push(format!(
                "package {} is both removed and upgraded",
                old.nevra()
            ));
            return;
        }

        // Already at this version or newer: nothing to do.
        if old.version() >= target.version() {
            return;
        }

        self.removals.insert(old.nevra(), old.clone());
        self.installs.insert(
            target.nevra(),
            InstallEntry {
                record: target.clone(),
                reason: ActionReason::Requested,
                replaces: Some(old),
            },
        );
        self.queue.push_back(target.nevra());
    }

    /// Whether the post-transaction system satisfies `req`.
    fn requirement_satisfied(&self, req: &Requirement) -> bool {
        if self
            .installs
            .values()
            .any(|e| e.record.name() == req.name && req.matches(e.record.version()))
        {
            return true;
        }
        if let Some(list) = self.installed_by_name.get(req.name.as_str()) {
            return list
                .iter()
                .any(|r| req.matches(r.version()) && !self.removals.contains_key(&r.nevra()));
        }
        false
    }

    /// Walk requirements of queued installs, pulling in providers.
    fn close_dependencies(&mut self) {
        while let Some(nevra) = self.queue.pop_front() {
            let requires = match self.installs.get(&nevra) {
                Some(entry) => entry.record.requires().to_vec(),
                None => continue,
            };

            for req in requires {
                if self.requirement_satisfied(&req) {
                    continue;
                }

                let provider = self
                    .available_by_name
                    .get(req.name.as_str())
                    .and_then(|list| {
                        list.iter()
                            .find(|r| {
                                req.matches(r.version())
                                    && !self.removals.contains_key(&r.nevra())
                            })
                            .map(|r| (*r).clone())
                    });

                match provider {
                    Some(provider) => self.add_install(&provider, ActionReason::Dependency),
                    None => self.problems.unmet.push(UnmetRequirement {
                        package: nevra.clone(),
                        requirement: req.to_string(),
                    }),
                }
            }
        }
    }

    /// Verify no surviving installed package loses a dependency to a removal.
    fn check_survivors(&mut self) {
        let survivors: Vec<&PackageRecord> = self
            .installed_by_nevra
            .values()
            .filter(|r| !self.removals.contains_key(&r.nevra()))
            .copied()
            .collect();

        for survivor in survivors {
            for req in survivor.requires() {
                if self.requirement_satisfied(req) {
                    continue;
                }
                // Only blame this transaction for breakage it introduces.
                let broken_by_removal = self
                    .removals
                    .values()
                    .any(|r| r.name() == req.name && req.matches(r.version()));
                if broken_by_removal {
                    self.problems.unmet.push(UnmetRequirement {
                        package: survivor.nevra(),
                        requirement: req.to_string(),
                    });
                }
            }
        }
    }

    /// Emit the ordered plan: installs and upgrades dependency-first, then
    /// explicit removals dependent-first.
    fn into_plan(mut self) -> Vec<PlannedAction> {
        let mut plan = Vec::new();

        for nevra in order_installs(&self.installs) {
            let entry = self.installs.remove(&nevra).expect("ordered nevra exists");
            let kind = match entry.replaces {
                Some(old) => ActionKind::Upgrade { replaces: old },
                None => ActionKind::Install,
            };
            plan.push(PlannedAction {
                kind,
                package: entry.record,
                reason: entry.reason,
            });
        }

        for nevra in order_removals(&self.removals, &self.pure_removes) {
            let record = self.removals.remove(&nevra).expect("ordered nevra exists");
            plan.push(PlannedAction {
                kind: ActionKind::Remove,
                package: record,
                reason: ActionReason::Requested,
            });
        }

        plan
    }
}

/// Topological order over queued installs: providers before dependents,
/// ties broken by nevra.
fn order_installs(installs: &BTreeMap<String, InstallEntry>) -> Vec<String> {
    let mut edges: BTreeSet<(String, String)> = BTreeSet::new();
    for (dependent, entry) in installs {
        for req in entry.record.requires() {
            for (provider, candidate) in installs {
                if provider != dependent
                    && candidate.record.name() == req.name
                    && req.matches(candidate.record.version())
                {
                    edges.insert((provider.clone(), dependent.clone()));
                }
            }
        }
    }
    kahn_order(installs.keys().cloned().collect(), &edges)
}

/// Topological order over explicit removals: dependents before the
/// packages they require.
fn order_removals(
    removals: &BTreeMap<String, PackageRecord>,
    pure_removes: &BTreeSet<String>,
) -> Vec<String> {
    let mut edges: BTreeSet<(String, String)> = BTreeSet::new();
    for dependent in pure_removes {
        let record = &removals[dependent];
        for req in record.requires() {
            for provider in pure_removes {
                if provider != dependent {
                    let candidate = &removals[provider];
                    if candidate.name() == req.name && req.matches(candidate.version()) {
                        edges.insert((dependent.clone(), provider.clone()));
                    }
                }
            }
        }
    }
    kahn_order(pure_removes.iter().cloned().collect(), &edges)
}

/// Kahn's algorithm with a sorted ready set; cycle members are appended in
/// sorted order rather than failing the plan.
fn kahn_order(nodes: Vec<String>, edges: &BTreeSet<(String, String)>) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (before, after) in edges {
        *indegree.entry(after.as_str()).or_insert(0) += 1;
        successors
            .entry(before.as_str())
            .or_default()
            .push(after.as_str());
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut ordered: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.iter().next().copied() {
        ready.remove(node);
        ordered.push(node.to_string());
        if let Some(next) = successors.get(node) {
            for succ in next {
                let degree = indegree.get_mut(succ).expect("edge endpoint exists");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(succ);
                }
            }
        }
    }

    if ordered.len() < nodes.len() {
        let seen: BTreeSet<String> = ordered.iter().cloned().collect();
        for node in &nodes {
            if !seen.contains(node.as_str()) {
                ordered.push(node.clone());
            }
        }
    }

    ordered
}
