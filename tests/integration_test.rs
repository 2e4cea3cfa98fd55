// tests/integration_test.rs

//! Integration tests for Cairn
//!
//! These tests verify end-to-end behavior across modules: repository
//! loading, querying, and the staged transaction protocol, all against a
//! local on-disk repository fixture.

use cairn::db::models::{Changeset, ChangesetStatus, InstalledPackage};
use cairn::{Base, Config, Error, TxnStage};
use sha2::{Digest, Sha256};
use std::path::Path;
use tempfile::TempDir;

/// Write a local repository with real artifacts and a JSON index.
///
/// Packages: curl (requires libcurl), libcurl, and a standalone jq.
fn build_fixture_repo(dir: &Path) {
    std::fs::create_dir_all(dir.join("packages")).unwrap();

    let mut entries = Vec::new();
    for (name, version, requires) in [
        ("curl", "8.0.1-2", r#""libcurl >= 8.0.1""#),
        ("libcurl", "8.0.1-2", ""),
        ("jq", "1.7-1", ""),
    ] {
        let payload = format!("{}-{} artifact bytes", name, version);
        let location = format!("packages/{}-{}.rpm", name, version);
        std::fs::write(dir.join(&location), &payload).unwrap();

        entries.push(format!(
            r#"{{"name": "{}", "version": "{}", "arch": "x86_64",
                "summary": "{} package", "checksum": "{:x}",
                "download_size": {}, "install_size": {},
                "location": "{}", "requires": [{}]}}"#,
            name,
            version,
            name,
            Sha256::digest(payload.as_bytes()),
            payload.len(),
            payload.len() * 3,
            location,
            requires,
        ));
    }

    std::fs::write(
        dir.join("metadata.json"),
        format!(
            r#"{{"name": "fixture", "packages": [{}]}}"#,
            entries.join(", ")
        ),
    )
    .unwrap();
}

/// Base with the fixture repository configured, enabled, and loaded.
fn ready_base(root: &TempDir) -> Base {
    let repo_dir = root.path().join("repo");
    build_fixture_repo(&repo_dir);

    let mut base = Base::new(Config::with_root_dir(root.path()));
    base.setup().unwrap();
    {
        let repo = base.add_repo("base").unwrap();
        repo.set_baseurl(repo_dir.to_str().unwrap()).unwrap();
        repo.enable().unwrap();
    }
    base.load_repos().unwrap();
    base
}

#[test]
fn test_repository_lifecycle_and_query_scenario() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    assert!(base.repo("base").unwrap().is_loaded());

    // The canonical lookup: one named package, deterministic first result.
    let mut query = base.query().unwrap().filter_name("curl").unwrap();
    assert!(query.size() >= 1);
    assert_eq!(query.get(0).unwrap().name(), "curl");
    assert_eq!(query.get(0).unwrap().version().to_string(), "8.0.1-2");
}

#[test]
fn test_unfiltered_query_covers_combined_universe() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    let mut query = base.query().unwrap();
    assert_eq!(query.size(), 3, "three repository packages, none installed");
}

#[test]
fn test_load_repos_without_repositories_is_trivial_success() {
    let root = TempDir::new().unwrap();
    let mut base = Base::new(Config::with_root_dir(root.path()));
    base.setup().unwrap();

    base.load_repos().unwrap();
    assert_eq!(base.query().unwrap().size(), 0);
}

#[test]
fn test_repository_load_is_idempotent_end_to_end() {
    let root = TempDir::new().unwrap();
    let repo_dir = root.path().join("repo");
    build_fixture_repo(&repo_dir);

    let mut base = Base::new(Config::with_root_dir(root.path()));
    base.setup().unwrap();
    {
        let repo = base.add_repo("base").unwrap();
        repo.set_baseurl(repo_dir.to_str().unwrap()).unwrap();
        repo.enable().unwrap();
    }
    base.load_repos().unwrap();
    assert!(base.repo("base").unwrap().is_loaded());

    // Remove the metadata from disk: a second load_repos must not care,
    // because loaded repositories are not re-fetched.
    std::fs::remove_file(repo_dir.join("metadata.json")).unwrap();
    base.load_repos().unwrap();
    assert!(base.repo("base").unwrap().is_loaded());
    assert_eq!(base.repo("base").unwrap().packages().len(), 3);
}

#[test]
fn test_install_transaction_end_to_end() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    let mut query = base.query().unwrap().filter_name("curl").unwrap();
    let curl = query.get(0).unwrap().clone();

    let mut txn = base.transaction().unwrap();
    txn.add_install(&curl).unwrap();

    txn.resolve().unwrap();
    // The dependency closure pulled in libcurl.
    let planned: Vec<String> = txn.plan().iter().map(|a| a.package.nevra()).collect();
    assert_eq!(
        planned,
        vec!["libcurl-8.0.1-2.x86_64", "curl-8.0.1-2.x86_64"],
        "provider ordered before dependent"
    );

    txn.download().unwrap();
    txn.test().unwrap();
    txn.run().unwrap();
    assert_eq!(txn.stage(), TxnStage::Committed);
    drop(txn);

    // A fresh Base over the same root sees the committed state.
    let mut fresh = Base::new(Config::with_root_dir(root.path()));
    fresh.setup().unwrap();
    fresh.load_repos().unwrap();

    let mut installed = fresh.query().unwrap().filter_installed(true);
    let names: Vec<&str> = installed.records().iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["curl", "libcurl"]);

    // The commit is on record as an applied changeset.
    let conn = cairn::db::open(&fresh.config().db_path).unwrap();
    let changesets = Changeset::list_all(&conn).unwrap();
    assert_eq!(changesets.len(), 1);
    assert_eq!(changesets[0].status, ChangesetStatus::Applied);
    assert!(changesets[0].summary.contains("install curl-8.0.1-2.x86_64"));
}

#[test]
fn test_remove_with_dependent_fails_resolution() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    // Install curl + libcurl first.
    {
        let mut query = base.query().unwrap().filter_name("curl").unwrap();
        let curl = query.get(0).unwrap().clone();
        let mut txn = base.transaction().unwrap();
        txn.add_install(&curl).unwrap();
        txn.resolve().unwrap();
        txn.download().unwrap();
        txn.test().unwrap();
        txn.run().unwrap();
    }

    let mut fresh = Base::new(Config::with_root_dir(root.path()));
    fresh.setup().unwrap();
    fresh.load_repos().unwrap();

    // Removing libcurl must fail: installed curl still requires it.
    let mut query = fresh
        .query()
        .unwrap()
        .filter_name("libcurl")
        .unwrap()
        .filter_installed(true);
    let libcurl = query.get(0).unwrap().clone();

    let mut txn = fresh.transaction().unwrap();
    txn.add_remove(&libcurl).unwrap();

    let err = txn.resolve().unwrap_err();
    match &err {
        Error::Unresolvable(problems) => {
            assert_eq!(problems.unmet.len(), 1);
            assert_eq!(problems.unmet[0].package, "curl-8.0.1-2.x86_64");
            assert_eq!(problems.unmet[0].requirement, "libcurl >= 8.0.1");
        }
        other => panic!("expected Unresolvable, got {:?}", other),
    }

    // Terminal failure: empty plan, untouched request list, Failed stage.
    assert_eq!(txn.stage(), TxnStage::Failed);
    assert!(txn.plan().is_empty());
    assert_eq!(txn.requested_ops().len(), 1);

    // Nothing changed on the system.
    let conn = cairn::db::open(&fresh.config().db_path).unwrap();
    assert_eq!(InstalledPackage::list_all(&conn).unwrap().len(), 2);
}

#[test]
fn test_resolution_is_deterministic_across_transactions() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    let mut query = base.query().unwrap().filter_name("curl").unwrap();
    let curl = query.get(0).unwrap().clone();

    let plan_of = |base: &Base| {
        let mut txn = base.transaction().unwrap();
        txn.add_install(&curl).unwrap();
        txn.resolve().unwrap();
        txn.plan().to_vec()
    };

    let first = plan_of(&base);
    let second = plan_of(&base);
    assert_eq!(first, second, "identical inputs must produce identical plans");
}

#[test]
fn test_standalone_install_then_remove_round_trip() {
    let root = TempDir::new().unwrap();
    let base = ready_base(&root);

    {
        let mut query = base.query().unwrap().filter_name("jq").unwrap();
        let jq = query.get(0).unwrap().clone();
        let mut txn = base.transaction().unwrap();
        txn.add_install(&jq).unwrap();
        txn.resolve().unwrap();
        assert_eq!(txn.plan().len(), 1, "jq has no dependencies");
        txn.download().unwrap();
        txn.test().unwrap();
        txn.run().unwrap();
    }

    let mut fresh = Base::new(Config::with_root_dir(root.path()));
    fresh.setup().unwrap();
    fresh.load_repos().unwrap();
    assert_eq!(fresh.installed_packages().len(), 1);

    {
        let jq = fresh.installed_packages()[0].clone();
        let mut txn = fresh.transaction().unwrap();
        txn.add_remove(&jq).unwrap();
        txn.resolve().unwrap();
        txn.download().unwrap();
        txn.test().unwrap();
        txn.run().unwrap();
    }

    let conn = cairn::db::open(&fresh.config().db_path).unwrap();
    assert!(InstalledPackage::list_all(&conn).unwrap().is_empty());

    // Both commits are in the history, newest first.
    let changesets = Changeset::list_all(&conn).unwrap();
    assert_eq!(changesets.len(), 2);
    assert!(changesets[0].summary.starts_with("remove"));
    assert!(changesets[1].summary.starts_with("install"));
}

#[test]
fn test_refresh_installed_after_commit() {
    let root = TempDir::new().unwrap();
    let mut base = ready_base(&root);

    {
        let mut query = base.query().unwrap().filter_name("jq").unwrap();
        let jq = query.get(0).unwrap().clone();
        let mut txn = base.transaction().unwrap();
        txn.add_install(&jq).unwrap();
        txn.resolve().unwrap();
        txn.download().unwrap();
        txn.test().unwrap();
        txn.run().unwrap();
    }

    // The live Base still holds the pre-commit snapshot until refreshed.
    assert!(base.installed_packages().is_empty());
    base.refresh_installed().unwrap();
    assert_eq!(base.installed_packages().len(), 1);
    assert_eq!(base.installed_packages()[0].name(), "jq");
}
