// src/query.rs

//! Package queries
//!
//! A `Query` is a filterable view over its Base's combined installed and
//! repository indices. Filters compose conjunctively (AND). Evaluation is
//! lazy: the result set materializes on the first `size`/`get` access and
//! stays cached until another filter is added.
//!
//! Result ordering is deterministic for a given Base state: name, then
//! version, then arch, then origin.

use crate::base::Base;
use crate::error::{Error, Result};
use crate::package::PackageRecord;

#[derive(Debug, Clone)]
enum Filter {
    Name(String),
    NameLike(String),
    Installed(bool),
    Arch(String),
}

impl Filter {
    fn matches(&self, record: &PackageRecord) -> bool {
        match self {
            Filter::Name(name) => record.name() == name,
            Filter::NameLike(pattern) => {
                let pattern = pattern.to_lowercase();
                record.name().to_lowercase().contains(&pattern)
                    || record.summary().to_lowercase().contains(&pattern)
            }
            Filter::Installed(installed) => record.is_installed() == *installed,
            Filter::Arch(arch) => record.arch() == arch,
        }
    }
}

/// A filterable, lazily evaluated view over the package universe.
pub struct Query<'base> {
    base: &'base Base,
    filters: Vec<Filter>,
    cached: Option<Vec<&'base PackageRecord>>,
}

impl<'base> Query<'base> {
    pub(crate) fn new(base: &'base Base) -> Self {
        Self {
            base,
            filters: Vec::new(),
            cached: None,
        }
    }

    /// Keep only packages with exactly this name.
    pub fn filter_name(mut self, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "name filter must not be empty".to_string(),
            ));
        }
        self.push(Filter::Name(name.to_string()));
        Ok(self)
    }

    /// Keep packages whose name or summary contains the pattern
    /// (case-insensitive).
    pub fn filter_name_like(mut self, pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument(
                "search pattern must not be empty".to_string(),
            ));
        }
        self.push(Filter::NameLike(pattern.to_string()));
        Ok(self)
    }

    /// Keep only installed (or only available) packages.
    pub fn filter_installed(mut self, installed: bool) -> Self {
        self.push(Filter::Installed(installed));
        self
    }

    /// Keep only packages for this architecture.
    pub fn filter_arch(mut self, arch: &str) -> Result<Self> {
        if arch.is_empty() {
            return Err(Error::InvalidArgument(
                "arch filter must not be empty".to_string(),
            ));
        }
        self.push(Filter::Arch(arch.to_string()));
        Ok(self)
    }

    fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
        self.cached = None;
    }

    /// Number of matching packages; forces evaluation.
    pub fn size(&mut self) -> usize {
        self.evaluate().len()
    }

    /// The record at `index` in the deterministic result ordering.
    pub fn get(&mut self, index: usize) -> Result<&'base PackageRecord> {
        let results = self.evaluate();
        let size = results.len();
        results
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange { index, size })
    }

    /// The full result set; forces evaluation.
    pub fn records(&mut self) -> &[&'base PackageRecord] {
        self.evaluate()
    }

    fn evaluate(&mut self) -> &Vec<&'base PackageRecord> {
        if self.cached.is_none() {
            let mut results: Vec<&'base PackageRecord> = self
                .base
                .universe()
                .filter(|record| self.filters.iter().all(|f| f.matches(record)))
                .collect();

            results.sort_by(|a, b| {
                a.name()
                    .cmp(b.name())
                    .then_with(|| a.version().cmp(b.version()))
                    .then_with(|| a.arch().cmp(b.arch()))
                    .then_with(|| a.origin().cmp(b.origin()))
            });

            self.cached = Some(results);
        }
        self.cached.as_ref().expect("just evaluated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    /// Base with one installed package (bash) and one repository carrying
    /// curl (two versions), vim, and a noarch tzdata.
    fn fixture_base(root: &TempDir) -> Base {
        let repo_dir = root.path().join("repo");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(
            repo_dir.join("metadata.json"),
            r#"{
                "name": "fixture",
                "packages": [
                    {"name": "curl", "version": "8.0.1-2", "arch": "x86_64",
                     "summary": "Command line tool for transferring data",
                     "location": "curl-8.0.1.rpm"},
                    {"name": "curl", "version": "7.9-1", "arch": "x86_64",
                     "location": "curl-7.9.rpm"},
                    {"name": "vim", "version": "9.0-1", "arch": "x86_64",
                     "summary": "The best text editor",
                     "location": "vim.rpm"},
                    {"name": "tzdata", "version": "2026a-1", "arch": "noarch",
                     "location": "tzdata.rpm"}
                ]
            }"#,
        )
        .unwrap();

        let mut base = Base::new(Config::with_root_dir(root.path()));
        base.setup().unwrap();

        {
            let conn = base.connection().unwrap();
            let mut row = crate::db::models::InstalledPackage {
                id: None,
                name: "bash".to_string(),
                epoch: 0,
                version: "5.2".to_string(),
                release: "3".to_string(),
                arch: "x86_64".to_string(),
                summary: "The GNU Bourne Again shell".to_string(),
                download_size: 0,
                install_size: 0,
                checksum: None,
                from_repo: None,
                installed_at: None,
                installed_by_changeset_id: None,
                requires: Vec::new(),
            };
            row.insert(conn).unwrap();
        }

        {
            let repo = base.add_repo("base").unwrap();
            repo.set_baseurl(repo_dir.to_str().unwrap()).unwrap();
            repo.enable().unwrap();
        }
        base.load_repos().unwrap();
        base
    }

    #[test]
    fn test_unfiltered_query_sees_whole_universe() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap();
        // 1 installed + 4 repository entries
        assert_eq!(query.size(), 5);
    }

    #[test]
    fn test_filter_name_scenario() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_name("curl").unwrap();
        assert!(query.size() >= 1);
        assert_eq!(query.get(0).unwrap().name(), "curl");
    }

    #[test]
    fn test_result_ordering_is_name_then_version() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_name("curl").unwrap();
        assert_eq!(query.size(), 2);
        assert_eq!(query.get(0).unwrap().version().to_string(), "7.9-1");
        assert_eq!(query.get(1).unwrap().version().to_string(), "8.0.1-2");
    }

    #[test]
    fn test_filters_compose_conjunctively() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base
            .query()
            .unwrap()
            .filter_name("curl")
            .unwrap()
            .filter_installed(false);
        assert_eq!(query.size(), 2);

        let mut none = base
            .query()
            .unwrap()
            .filter_name("curl")
            .unwrap()
            .filter_installed(true);
        assert_eq!(none.size(), 0);
    }

    #[test]
    fn test_filter_installed_finds_system_packages() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_installed(true);
        assert_eq!(query.size(), 1);
        assert_eq!(query.get(0).unwrap().name(), "bash");
    }

    #[test]
    fn test_filter_arch() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_arch("noarch").unwrap();
        assert_eq!(query.size(), 1);
        assert_eq!(query.get(0).unwrap().name(), "tzdata");
    }

    #[test]
    fn test_filter_name_like_searches_summaries() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_name_like("text editor").unwrap();
        assert_eq!(query.size(), 1);
        assert_eq!(query.get(0).unwrap().name(), "vim");
    }

    #[test]
    fn test_empty_filter_strings_are_rejected() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        assert!(matches!(
            base.query().unwrap().filter_name(""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            base.query().unwrap().filter_name_like(""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            base.query().unwrap().filter_arch(""),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_past_end_is_an_error() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap().filter_name("vim").unwrap();
        assert!(query.get(0).is_ok());
        assert!(matches!(
            query.get(1),
            Err(Error::IndexOutOfRange { index: 1, size: 1 })
        ));
    }

    #[test]
    fn test_cache_invalidates_when_filter_added() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut query = base.query().unwrap();
        assert_eq!(query.size(), 5);

        // Adding a filter after evaluation must re-evaluate.
        let mut narrowed = query.filter_name("curl").unwrap();
        assert_eq!(narrowed.size(), 2);
    }

    #[test]
    fn test_identical_queries_return_identical_results() {
        let root = TempDir::new().unwrap();
        let base = fixture_base(&root);

        let mut first = base.query().unwrap().filter_name_like("curl").unwrap();
        let mut second = base.query().unwrap().filter_name_like("curl").unwrap();

        let first_nevras: Vec<String> =
            first.records().iter().map(|r| r.nevra()).collect();
        let second_nevras: Vec<String> =
            second.records().iter().map(|r| r.nevra()).collect();
        assert_eq!(first_nevras, second_nevras);
    }
}
