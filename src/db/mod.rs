// src/db/mod.rs

//! Database access for setup and update
//!
//! Connections are single and non-pooled: each script run opens its own
//! connection and drops it when the run ends.

pub mod schema;
pub mod script;

use crate::config::{DatabaseConfig, SUPPORTED_PRODUCTS};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

pub use script::{
    parse_script, run_statements, ScriptError, ScriptErrorKind, ScriptKind, ScriptReport, SetupDb,
};

/// Open a connection to an existing or new database file
pub fn open(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    debug!("Opened database {}", path.display());
    Ok(conn)
}

/// Connect using the configured product and location
pub fn connect(config: &DatabaseConfig) -> Result<Connection> {
    if !SUPPORTED_PRODUCTS.contains(&config.product.as_str()) {
        return Err(Error::Config(format!(
            "Unsupported database product '{}' (supported: {})",
            config.product,
            SUPPORTED_PRODUCTS.join(", ")
        )));
    }
    open(&config.path)
}

/// Check whether a table exists
pub fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/cms.db");
        let conn = open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(path.exists());
        assert!(has_table(&conn, "t").unwrap());
        assert!(!has_table(&conn, "missing").unwrap());
    }

    #[test]
    fn test_connect_rejects_unknown_product() {
        let config = DatabaseConfig {
            product: "oracle".to_string(),
            path: PathBuf::from("/tmp/never.db"),
            user: String::new(),
            password: String::new(),
        };
        assert!(matches!(connect(&config), Err(Error::Config(_))));
    }

}
