// src/db/models.rs

//! Data models for the system package database
//!
//! Rust structs corresponding to database tables, with methods for
//! creating, reading, updating, and deleting records.

use crate::error::Result;
use crate::package::{Origin, PackageRecord};
use crate::version::{Evr, Requirement};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// An installed package row, requirements included.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub id: Option<i64>,
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub summary: String,
    pub download_size: u64,
    pub install_size: u64,
    pub checksum: Option<String>,
    /// Repository the package was installed from, if known.
    pub from_repo: Option<String>,
    pub installed_at: Option<String>,
    pub installed_by_changeset_id: Option<i64>,
    pub requires: Vec<Requirement>,
}

const PACKAGE_COLUMNS: &str = "id, name, epoch, version, release, arch, summary, \
     download_size, install_size, checksum, from_repo, installed_at, installed_by_changeset_id";

impl InstalledPackage {
    /// Build a row from a package record about to be committed.
    pub fn from_record(record: &PackageRecord, changeset_id: Option<i64>) -> Self {
        let from_repo = match record.origin() {
            Origin::System => None,
            Origin::Repository(id) => Some(id.clone()),
        };
        Self {
            id: None,
            name: record.name().to_string(),
            epoch: record.version().epoch,
            version: record.version().version.clone(),
            release: record.version().release.clone(),
            arch: record.arch().to_string(),
            summary: record.summary().to_string(),
            download_size: record.download_size(),
            install_size: record.install_size(),
            checksum: record.checksum().map(|s| s.to_string()),
            from_repo,
            installed_at: None,
            installed_by_changeset_id: changeset_id,
            requires: record.requires().to_vec(),
        }
    }

    /// View this row as an installed-origin package record.
    pub fn to_record(&self) -> PackageRecord {
        PackageRecord {
            name: self.name.clone(),
            evr: Evr::new(self.epoch, self.version.clone(), self.release.clone()),
            arch: self.arch.clone(),
            summary: self.summary.clone(),
            download_size: self.download_size,
            install_size: self.install_size,
            requires: self.requires.clone(),
            checksum: self.checksum.clone(),
            location: None,
            origin: Origin::System,
        }
    }

    /// Insert this package and its requirement rows.
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, epoch, version, release, arch, summary, \
             download_size, install_size, checksum, from_repo, installed_by_changeset_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &self.name,
                self.epoch,
                &self.version,
                &self.release,
                &self.arch,
                &self.summary,
                self.download_size as i64,
                self.install_size as i64,
                &self.checksum,
                &self.from_repo,
                &self.installed_by_changeset_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);

        for req in &self.requires {
            let constraint_spec = req
                .constraint
                .as_ref()
                .map(|(cmp, evr)| format!("{} {}", cmp.as_str(), evr));
            conn.execute(
                "INSERT INTO package_requires (package_id, name, constraint_spec) VALUES (?1, ?2, ?3)",
                params![id, &req.name, &constraint_spec],
            )?;
        }

        Ok(id)
    }

    /// Find the installed row matching an exact NEVRA, if any.
    pub fn find_by_nevra(
        conn: &Connection,
        name: &str,
        evr: &Evr,
        arch: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1 AND epoch = ?2 AND version = ?3 \
             AND release = ?4 AND arch = ?5",
            PACKAGE_COLUMNS
        ))?;

        let package = stmt
            .query_row(
                params![name, evr.epoch, &evr.version, &evr.release, arch],
                Self::from_row,
            )
            .optional()?;

        match package {
            Some(mut package) => {
                package.load_requires(conn)?;
                Ok(Some(package))
            }
            None => Ok(None),
        }
    }

    /// Find installed rows by name.
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1 ORDER BY epoch, version, release, arch",
            PACKAGE_COLUMNS
        ))?;

        let mut packages = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for package in &mut packages {
            package.load_requires(conn)?;
        }
        Ok(packages)
    }

    /// List all installed packages, requirements loaded.
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY name, epoch, version, release, arch",
            PACKAGE_COLUMNS
        ))?;

        let mut packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for package in &mut packages {
            package.load_requires(conn)?;
        }
        Ok(packages)
    }

    /// Delete a package row; requirement rows cascade.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    fn load_requires(&mut self, conn: &Connection) -> Result<()> {
        let id = match self.id {
            Some(id) => id,
            None => return Ok(()),
        };

        let mut stmt = conn.prepare(
            "SELECT name, constraint_spec FROM package_requires WHERE package_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map([id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.requires = rows
            .into_iter()
            .map(|(name, constraint_spec)| match constraint_spec {
                Some(spec) => Requirement::parse(&format!("{} {}", name, spec)),
                None => Ok(Requirement::unversioned(name)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            epoch: row.get::<_, i64>(2)? as u32,
            version: row.get(3)?,
            release: row.get(4)?,
            arch: row.get(5)?,
            summary: row.get(6)?,
            download_size: row.get::<_, i64>(7)? as u64,
            install_size: row.get::<_, i64>(8)? as u64,
            checksum: row.get(9)?,
            from_repo: row.get(10)?,
            installed_at: row.get(11)?,
            installed_by_changeset_id: row.get(12)?,
            requires: Vec::new(),
        })
    }
}

/// Changeset status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesetStatus {
    Pending,
    Applied,
    RolledBack,
}

impl ChangesetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::Applied => "applied",
            ChangesetStatus::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for ChangesetStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChangesetStatus::Pending),
            "applied" => Ok(ChangesetStatus::Applied),
            "rolled_back" => Ok(ChangesetStatus::RolledBack),
            _ => Err(format!("Invalid changeset status: {}", s)),
        }
    }
}

/// One commit attempt and its outcome.
#[derive(Debug, Clone)]
pub struct Changeset {
    pub id: Option<i64>,
    pub summary: String,
    pub status: ChangesetStatus,
    pub created_at: Option<String>,
    pub applied_at: Option<String>,
    pub rolled_back_at: Option<String>,
}

impl Changeset {
    pub fn new(summary: String) -> Self {
        Self {
            id: None,
            summary,
            status: ChangesetStatus::Pending,
            created_at: None,
            applied_at: None,
            rolled_back_at: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO changesets (summary, status) VALUES (?1, ?2)",
            params![&self.summary, self.status.as_str()],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, summary, status, created_at, applied_at, rolled_back_at
             FROM changesets WHERE id = ?1",
        )?;

        let changeset = stmt.query_row([id], Self::from_row).optional()?;
        Ok(changeset)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, summary, status, created_at, applied_at, rolled_back_at
             FROM changesets ORDER BY id DESC",
        )?;

        let changesets = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(changesets)
    }

    /// Update changeset status, stamping the matching timestamp column.
    pub fn update_status(&mut self, conn: &Connection, new_status: ChangesetStatus) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::State("cannot update changeset without ID".to_string())
        })?;

        match new_status {
            ChangesetStatus::Applied => {
                conn.execute(
                    "UPDATE changesets SET status = ?1, applied_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![new_status.as_str(), id],
                )?;
            }
            ChangesetStatus::RolledBack => {
                conn.execute(
                    "UPDATE changesets SET status = ?1, rolled_back_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![new_status.as_str(), id],
                )?;
            }
            ChangesetStatus::Pending => {
                conn.execute(
                    "UPDATE changesets SET status = ?1 WHERE id = ?2",
                    params![new_status.as_str(), id],
                )?;
            }
        }

        self.status = new_status;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(2)?;
        let status = status_str.parse::<ChangesetStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            summary: row.get(1)?,
            status,
            created_at: row.get(3)?,
            applied_at: row.get(4)?,
            rolled_back_at: row.get(5)?,
        })
    }
}

/// Persistent repository configuration, used by the CLI to rebuild the
/// repository set between invocations.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub id: Option<i64>,
    pub repo_id: String,
    pub baseurl: String,
    pub enabled: bool,
    pub gpg_check: bool,
    pub priority: i32,
    pub last_sync: Option<String>,
    pub created_at: Option<String>,
}

impl RepoConfig {
    pub fn new(repo_id: String, baseurl: String) -> Self {
        Self {
            id: None,
            repo_id,
            baseurl,
            enabled: true,
            gpg_check: true,
            priority: 0,
            last_sync: None,
            created_at: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (repo_id, baseurl, enabled, gpg_check, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.repo_id,
                &self.baseurl,
                self.enabled as i32,
                self.gpg_check as i32,
                &self.priority,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_repo_id(conn: &Connection, repo_id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, baseurl, enabled, gpg_check, priority, last_sync, created_at
             FROM repositories WHERE repo_id = ?1",
        )?;

        let repo = stmt.query_row([repo_id], Self::from_row).optional()?;
        Ok(repo)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, baseurl, enabled, gpg_check, priority, last_sync, created_at
             FROM repositories ORDER BY priority DESC, repo_id",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, baseurl, enabled, gpg_check, priority, last_sync, created_at
             FROM repositories WHERE enabled = 1 ORDER BY priority DESC, repo_id",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::State("cannot update repository without ID".to_string())
        })?;

        conn.execute(
            "UPDATE repositories SET repo_id = ?1, baseurl = ?2, enabled = ?3, gpg_check = ?4,
             priority = ?5, last_sync = ?6 WHERE id = ?7",
            params![
                &self.repo_id,
                &self.baseurl,
                self.enabled as i32,
                self.gpg_check as i32,
                &self.priority,
                &self.last_sync,
                id,
            ],
        )?;

        Ok(())
    }

    pub fn delete(conn: &Connection, repo_id: &str) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE repo_id = ?1", [repo_id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repo_id: row.get(1)?,
            baseurl: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
            gpg_check: row.get::<_, i32>(4)? != 0,
            priority: row.get(5)?,
            last_sync: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn sample_package() -> InstalledPackage {
        InstalledPackage {
            id: None,
            name: "curl".to_string(),
            epoch: 0,
            version: "8.0.1".to_string(),
            release: "2.fc43".to_string(),
            arch: "x86_64".to_string(),
            summary: "Command line tool for transferring data".to_string(),
            download_size: 350_000,
            install_size: 800_000,
            checksum: Some("abc123".to_string()),
            from_repo: Some("base".to_string()),
            installed_at: None,
            installed_by_changeset_id: None,
            requires: vec![
                Requirement::parse("libcurl >= 8.0.1").unwrap(),
                Requirement::unversioned("glibc"),
            ],
        }
    }

    #[test]
    fn test_package_crud_round_trip() {
        let (_temp, conn) = create_test_db();

        let mut package = sample_package();
        let id = package.insert(&conn).unwrap();
        assert!(id > 0);

        let evr = Evr::new(0, "8.0.1", "2.fc43");
        let found = InstalledPackage::find_by_nevra(&conn, "curl", &evr, "x86_64")
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "curl");
        assert_eq!(found.requires.len(), 2);
        assert_eq!(found.requires[0].to_string(), "libcurl >= 8.0.1");

        let by_name = InstalledPackage::find_by_name(&conn, "curl").unwrap();
        assert_eq!(by_name.len(), 1);

        InstalledPackage::delete(&conn, id).unwrap();
        let gone = InstalledPackage::find_by_nevra(&conn, "curl", &evr, "x86_64").unwrap();
        assert!(gone.is_none());

        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM package_requires", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0, "requires should cascade on delete");
    }

    #[test]
    fn test_package_record_conversion() {
        let package = sample_package();
        let record = package.to_record();

        assert_eq!(record.name(), "curl");
        assert_eq!(record.version().to_string(), "8.0.1-2.fc43");
        assert!(record.is_installed());
        assert_eq!(record.requires().len(), 2);

        let back = InstalledPackage::from_record(&record, Some(7));
        assert_eq!(back.name, "curl");
        assert_eq!(back.installed_by_changeset_id, Some(7));
        // System-origin records do not carry a source repository.
        assert_eq!(back.from_repo, None);
    }

    #[test]
    fn test_list_all_is_ordered_by_name() {
        let (_temp, conn) = create_test_db();

        let mut zsh = sample_package();
        zsh.name = "zsh".to_string();
        zsh.insert(&conn).unwrap();

        let mut bash = sample_package();
        bash.name = "bash".to_string();
        bash.insert(&conn).unwrap();

        let all = InstalledPackage::list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "bash");
        assert_eq!(all[1].name, "zsh");
    }

    #[test]
    fn test_changeset_lifecycle() {
        let (_temp, conn) = create_test_db();

        let mut changeset = Changeset::new("install curl-8.0.1-2.fc43.x86_64".to_string());
        let id = changeset.insert(&conn).unwrap();
        assert_eq!(changeset.status, ChangesetStatus::Pending);

        changeset
            .update_status(&conn, ChangesetStatus::Applied)
            .unwrap();
        let reloaded = Changeset::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(reloaded.status, ChangesetStatus::Applied);
        assert!(reloaded.applied_at.is_some());

        let all = Changeset::list_all(&conn).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_changeset_rollback_stamps_timestamp() {
        let (_temp, conn) = create_test_db();

        let mut changeset = Changeset::new("remove old-tool".to_string());
        let id = changeset.insert(&conn).unwrap();
        changeset
            .update_status(&conn, ChangesetStatus::RolledBack)
            .unwrap();

        let reloaded = Changeset::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(reloaded.status, ChangesetStatus::RolledBack);
        assert!(reloaded.rolled_back_at.is_some());
        assert!(reloaded.applied_at.is_none());
    }

    #[test]
    fn test_repo_config_crud() {
        let (_temp, conn) = create_test_db();

        let mut repo = RepoConfig::new(
            "base".to_string(),
            "https://example.com/repo".to_string(),
        );
        repo.priority = 10;
        repo.insert(&conn).unwrap();

        // repo_id is unique
        let mut dup = RepoConfig::new("base".to_string(), "https://other".to_string());
        assert!(dup.insert(&conn).is_err());

        let mut found = RepoConfig::find_by_repo_id(&conn, "base").unwrap().unwrap();
        assert!(found.enabled);
        assert_eq!(found.priority, 10);

        found.enabled = false;
        found.last_sync = Some("2026-08-05T00:00:00Z".to_string());
        found.update(&conn).unwrap();

        assert!(RepoConfig::list_enabled(&conn).unwrap().is_empty());
        assert_eq!(RepoConfig::list_all(&conn).unwrap().len(), 1);

        RepoConfig::delete(&conn, "base").unwrap();
        assert!(RepoConfig::find_by_repo_id(&conn, "base").unwrap().is_none());
    }
}
