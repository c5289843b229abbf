// src/db/schema.rs

//! Bookkeeping schema for the content repository
//!
//! The product scripts create the server's own tables. On top of those the
//! setup keeps its own records (which module versions are imported, which
//! setup and update runs happened) in tables managed here, versioned the
//! same way so later releases can evolve them.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS setup_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM setup_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO setup_schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the bookkeeping tables up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version >= SCHEMA_VERSION {
        debug!("Setup schema is up to date (version {})", current_version);
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying setup schema migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::Config(format!(
            "Unknown setup schema version: {}",
            version
        ))),
    }
}

/// Imported module versions
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE installed_modules (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            description TEXT,
            package_file TEXT NOT NULL,
            file_count INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Setup and update run history
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE setup_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL CHECK(operation IN ('setup', 'update')),
            status TEXT NOT NULL CHECK(status IN ('running', 'finished', 'failed', 'cancelled')),
            started_at TEXT NOT NULL,
            finished_at TEXT,
            modules INTEGER NOT NULL DEFAULT 0,
            message TEXT
        );

        CREATE INDEX idx_setup_runs_started_at ON setup_runs(started_at);
        ",
    )?;
    Ok(())
}

/// Record the start of a setup or update run
pub fn begin_run(conn: &Connection, operation: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO setup_runs (operation, status, started_at) VALUES (?1, 'running', ?2)",
        params![operation, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record the end of a run
pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    modules: usize,
    message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE setup_runs SET status = ?1, finished_at = ?2, modules = ?3, message = ?4
         WHERE id = ?5",
        params![
            status,
            chrono::Utc::now().to_rfc3339(),
            modules as i64,
            message,
            run_id
        ],
    )?;
    Ok(())
}

/// Timestamp of the most recent finished run of `operation`
pub fn last_finished_run(conn: &Connection, operation: &str) -> Result<Option<String>> {
    let finished = conn
        .query_row(
            "SELECT finished_at FROM setup_runs
             WHERE operation = ?1 AND status = 'finished'
             ORDER BY id DESC LIMIT 1",
            [operation],
            |row| row.get(0),
        )
        .optional()?;
    Ok(finished)
}
