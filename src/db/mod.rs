// src/db/mod.rs

//! System package database
//!
//! SQLite-backed record of what is installed on the system, plus the
//! changeset history of every commit. This module handles:
//! - Database initialization and schema migration
//! - Connection management and pragmas
//! - A closure-based transaction helper used by the commit stage

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Initialize the package database at the specified path.
///
/// Creates the database file, sets pragmas, and migrates the schema.
/// Idempotent: calling it on an existing database is safe.
pub fn init(db_path: &Path) -> Result<Connection> {
    debug!("Initializing package database at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Setup(format!(
                "failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let conn = Connection::open(db_path)?;

    // Pragmas for reliability under concurrent readers
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Package database ready at {}", db_path.display());
    Ok(conn)
}

/// Open an existing package database without migrating.
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(Error::Setup(format!(
            "package database not found at {}",
            db_path.display()
        )));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

/// Run `f` inside a database transaction; commit on Ok, roll back on Err.
pub fn transaction<T, F>(conn: &Connection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let tx = conn.unchecked_transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}
