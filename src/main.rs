// src/main.rs

use anyhow::{Context, Result, bail};
use cairn::db::models::{Changeset, RepoConfig};
use cairn::{Base, Config, Error, PackageRecord, db};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about = "Package transaction engine with staged execution", long_about = None)]
struct Cli {
    /// Root directory holding the database and artifact cache
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the package database
    Init,
    /// Add a repository
    RepoAdd {
        /// Repository id
        id: String,
        /// Repository base URL (http(s), file, or absolute path)
        url: String,
        /// Priority (higher = preferred)
        #[arg(short, long, default_value = "0")]
        priority: i32,
        /// Skip artifact verification for this repository
        #[arg(long)]
        nogpgcheck: bool,
        /// Add the repository disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List configured repositories
    RepoList {
        /// Show disabled repositories too
        #[arg(short, long)]
        all: bool,
    },
    /// Remove a repository
    RepoRemove {
        /// Repository id
        id: String,
    },
    /// Load repository metadata and report package counts
    Sync,
    /// Search packages by name or summary
    Search {
        /// Search pattern
        pattern: String,
    },
    /// Install packages from repositories
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Upgrade installed packages (all of them if none given)
    Upgrade {
        /// Package names
        packages: Vec<String>,
    },
    /// Show changeset history
    History,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn build_config(root: &Option<PathBuf>) -> Config {
    match root {
        Some(dir) => Config::with_root_dir(dir),
        None => Config::default(),
    }
}

/// Set up a Base with every enabled repository from the database, loaded.
fn open_base(config: &Config) -> Result<Base> {
    let mut base = Base::new(config.clone());
    base.setup()?;

    let conn = db::open(&config.db_path)?;
    for stored in RepoConfig::list_enabled(&conn)? {
        let repo = base.add_repo(&stored.repo_id)?;
        repo.set_baseurl(&stored.baseurl)?;
        repo.set_gpg_check(stored.gpg_check);
        repo.set_priority(stored.priority);
        repo.enable()?;
    }

    match base.load_repos() {
        Ok(()) => {}
        Err(Error::RepoLoad { failures }) => {
            for failure in &failures {
                eprintln!(
                    "warning: repository '{}' skipped: {}",
                    failure.repo_id, failure.reason
                );
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(base)
}

/// Newest available (non-installed) record for a package name.
fn find_available(base: &Base, name: &str) -> Result<PackageRecord> {
    let mut query = base.query()?.filter_name(name)?.filter_installed(false);
    let size = query.size();
    if size == 0 {
        bail!("no package '{}' found in any repository", name);
    }
    // Results are ordered by version ascending; the last one is newest.
    Ok(query.get(size - 1)?.clone())
}

/// Newest installed record for a package name.
fn find_installed(base: &Base, name: &str) -> Result<PackageRecord> {
    let mut query = base.query()?.filter_name(name)?.filter_installed(true);
    let size = query.size();
    if size == 0 {
        bail!("package '{}' is not installed", name);
    }
    Ok(query.get(size - 1)?.clone())
}

fn print_plan(txn: &cairn::Transaction<'_>) {
    println!("Transaction plan ({} action(s)):", txn.plan().len());
    for action in txn.plan() {
        println!("  {}", action.describe());
    }
    println!("  download size: {} bytes", txn.download_size());
    println!("  installed size change: {} bytes", txn.install_size_delta());
}

/// Drive a built transaction through resolve, download, test, and run.
fn execute(txn: &mut cairn::Transaction<'_>) -> Result<()> {
    txn.resolve().context("dependency resolution failed")?;
    if txn.plan().is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    print_plan(txn);

    txn.download().context("artifact download failed")?;
    txn.test().context("transaction verification failed")?;
    txn.run().context("transaction commit failed")?;

    println!("Transaction committed.");
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli.root);

    match cli.command {
        Some(Commands::Init) => {
            db::init(&config.db_path)?;
            println!("Database initialized at {}", config.db_path.display());
            Ok(())
        }
        Some(Commands::RepoAdd {
            id,
            url,
            priority,
            nogpgcheck,
            disabled,
        }) => {
            let conn = db::open(&config.db_path)?;
            if RepoConfig::find_by_repo_id(&conn, &id)?.is_some() {
                bail!("repository '{}' already exists", id);
            }

            let mut repo = RepoConfig::new(id.clone(), url.clone());
            repo.priority = priority;
            repo.gpg_check = !nogpgcheck;
            repo.enabled = !disabled;
            repo.insert(&conn)?;

            info!("Added repository '{}' ({})", id, url);
            println!("Added repository '{}'", id);
            Ok(())
        }
        Some(Commands::RepoList { all }) => {
            let conn = db::open(&config.db_path)?;
            let repos = if all {
                RepoConfig::list_all(&conn)?
            } else {
                RepoConfig::list_enabled(&conn)?
            };

            if repos.is_empty() {
                println!("No repositories configured.");
            } else {
                for repo in &repos {
                    println!(
                        "  {} {} [{}] priority={} last_sync={}",
                        repo.repo_id,
                        repo.baseurl,
                        if repo.enabled { "enabled" } else { "disabled" },
                        repo.priority,
                        repo.last_sync.as_deref().unwrap_or("never"),
                    );
                }
            }
            Ok(())
        }
        Some(Commands::RepoRemove { id }) => {
            let conn = db::open(&config.db_path)?;
            if RepoConfig::find_by_repo_id(&conn, &id)?.is_none() {
                bail!("repository '{}' not found", id);
            }
            RepoConfig::delete(&conn, &id)?;
            println!("Removed repository '{}'", id);
            Ok(())
        }
        Some(Commands::Sync) => {
            let base = open_base(&config)?;

            let conn = db::open(&config.db_path)?;
            for repo in base.repos() {
                if repo.is_loaded() {
                    println!("  {}: {} packages", repo.id(), repo.packages().len());
                    if let Some(mut stored) = RepoConfig::find_by_repo_id(&conn, repo.id())? {
                        stored.last_sync = Some(chrono::Utc::now().to_rfc3339());
                        stored.update(&conn)?;
                    }
                }
            }
            Ok(())
        }
        Some(Commands::Search { pattern }) => {
            let base = open_base(&config)?;
            let mut query = base.query()?.filter_name_like(&pattern)?;

            if query.size() == 0 {
                println!("No packages match '{}'.", pattern);
            } else {
                for record in query.records() {
                    println!(
                        "  {}-{}.{} ({}) {}",
                        record.name(),
                        record.version(),
                        record.arch(),
                        record.origin(),
                        record.summary(),
                    );
                }
            }
            Ok(())
        }
        Some(Commands::Install { packages }) => {
            let base = open_base(&config)?;
            let mut txn = base.transaction()?;

            for name in &packages {
                let record = find_available(&base, name)?;
                txn.add_install(&record)?;
            }
            execute(&mut txn)
        }
        Some(Commands::Remove { packages }) => {
            let base = open_base(&config)?;
            let mut txn = base.transaction()?;

            for name in &packages {
                let record = find_installed(&base, name)?;
                txn.add_remove(&record)?;
            }
            execute(&mut txn)
        }
        Some(Commands::Upgrade { packages }) => {
            let base = open_base(&config)?;

            let names: Vec<String> = if packages.is_empty() {
                base.installed_packages()
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect()
            } else {
                packages
            };

            let mut txn = base.transaction()?;
            let mut requested = 0;
            for name in &names {
                let installed = find_installed(&base, name)?;
                let candidate = match find_available(&base, name) {
                    Ok(candidate) => candidate,
                    // Nothing available for this name; skip it on a full
                    // upgrade sweep.
                    Err(_) => continue,
                };
                if candidate.version() > installed.version() {
                    txn.add_upgrade(&candidate)?;
                    requested += 1;
                }
            }

            if requested == 0 {
                println!("Nothing to upgrade.");
                return Ok(());
            }
            execute(&mut txn)
        }
        Some(Commands::History) => {
            let conn = db::open(&config.db_path)?;
            let changesets = Changeset::list_all(&conn)?;

            if changesets.is_empty() {
                println!("No changeset history.");
            } else {
                println!("Changeset history:");
                for changeset in &changesets {
                    let timestamp = changeset
                        .applied_at
                        .as_deref()
                        .or(changeset.rolled_back_at.as_deref())
                        .or(changeset.created_at.as_deref())
                        .unwrap_or("pending");
                    println!(
                        "  [{}] {} - {} ({})",
                        changeset.id.unwrap_or_default(),
                        timestamp,
                        changeset.summary,
                        changeset.status.as_str(),
                    );
                }
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cairn", &mut std::io::stdout());
            Ok(())
        }
        None => {
            println!("cairn v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'cairn --help' for usage information");
            Ok(())
        }
    }
}
