// src/db/script.rs

//! SQL script runner for database creation and table setup
//!
//! Each database product has a folder of plain-text scripts
//! (`create_db.sql`, `drop_db.sql`, `create_tables.sql`, `drop_tables.sql`,
//! `update_tables.sql`). A script is a sequence of `;`-terminated statements
//! that may use `${token}` placeholders.
//!
//! Failures never raise out of a script run. Every failing statement is
//! recorded as a [`ScriptError`] in the [`ScriptReport`]; with
//! `abort_on_error` the run stops at the first one, otherwise it keeps going.
//! There is no transactional envelope: every statement is committed on its
//! own, so a failed run leaves the statements before the failure applied.

use crate::config::{DatabaseConfig, SetupConfig};
use crate::error::{Error, Result};
use crate::progress::CancelToken;
use crate::template;
use rusqlite::Connection;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The scripts every product folder may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    CreateDatabase,
    DropDatabase,
    CreateTables,
    DropTables,
    UpdateTables,
}

impl ScriptKind {
    /// Script file name inside the product folder
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::CreateDatabase => "create_db.sql",
            Self::DropDatabase => "drop_db.sql",
            Self::CreateTables => "create_tables.sql",
            Self::DropTables => "drop_tables.sql",
            Self::UpdateTables => "update_tables.sql",
        }
    }

    /// Parse from the short name used on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create_db" | "create-db" => Some(Self::CreateDatabase),
            "drop_db" | "drop-db" => Some(Self::DropDatabase),
            "create_tables" | "create-tables" => Some(Self::CreateTables),
            "drop_tables" | "drop-tables" => Some(Self::DropTables),
            "update_tables" | "update-tables" => Some(Self::UpdateTables),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDatabase => "create_db",
            Self::DropDatabase => "drop_db",
            Self::CreateTables => "create_tables",
            Self::DropTables => "drop_tables",
            Self::UpdateTables => "update_tables",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a script step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// The database could not be opened
    Connection,
    /// A statement was rejected by the database
    Execution,
    /// The script file does not exist or cannot be read
    FileNotFound,
    /// The run was cancelled before this statement
    Cancelled,
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Execution => "execution",
            Self::FileNotFound => "file not found",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A single failure recorded during a script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    /// The statement after token substitution, if one was being executed
    pub statement: Option<String>,
    pub message: String,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.statement {
            Some(stmt) => write!(f, "[{}] {} (statement: {})", self.kind, self.message, stmt),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Outcome of one script run
#[derive(Debug, Clone, Default)]
pub struct ScriptReport {
    /// Script name, for report lines
    pub script: String,
    /// Statements found in the script
    pub statements: usize,
    /// Statements that ran successfully
    pub executed: usize,
    pub errors: Vec<ScriptError>,
    /// The run stopped before the end of the script
    pub aborted: bool,
}

impl ScriptReport {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, kind: ScriptErrorKind, statement: Option<String>, message: String) {
        self.errors.push(ScriptError {
            kind,
            statement,
            message,
        });
    }

    /// Convert into an error when any statement failed
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::ScriptFailed {
                script: self.script,
                errors: self.errors.len(),
            })
        }
    }
}

fn is_comment(line: &str) -> bool {
    let lower = line.to_lowercase();
    line.starts_with('#')
        || line.starts_with("--")
        || line.starts_with("//")
        || lower.starts_with("prompt")
        || lower == "rem"
        || lower.starts_with("rem ")
}

/// Split script text into statements
///
/// Lines are trimmed; blank lines and comment lines (`#`, `--`, `//`,
/// `rem`, `prompt`) are skipped. Remaining lines are joined with a single
/// space until a line ends with `;`, which ends the statement. Text left
/// over at the end of the script forms a final statement.
pub fn parse_script(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);

        if line.ends_with(';') {
            let stmt = current.trim_end_matches(';').trim().to_string();
            if !stmt.is_empty() {
                statements.push(stmt);
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}

/// Execute statements one by one, recording failures in `report`
pub fn run_statements(
    conn: &Connection,
    statements: &[String],
    replacer: &HashMap<String, String>,
    abort_on_error: bool,
    cancel: &CancelToken,
    report: &mut ScriptReport,
) {
    report.statements += statements.len();

    for (idx, raw) in statements.iter().enumerate() {
        if cancel.is_cancelled() {
            report.push(
                ScriptErrorKind::Cancelled,
                None,
                format!("Cancelled before statement {} of {}", idx + 1, statements.len()),
            );
            report.aborted = true;
            return;
        }

        let stmt = template::substitute(raw, replacer);
        debug!("[{}] executing: {}", report.script, stmt);

        match conn.execute_batch(&stmt) {
            Ok(()) => report.executed += 1,
            Err(e) => {
                warn!("[{}] statement failed: {}", report.script, e);
                report.push(ScriptErrorKind::Execution, Some(stmt), e.to_string());
                if abort_on_error {
                    report.aborted = true;
                    return;
                }
            }
        }
    }
}

/// Runs the product scripts against the configured database
#[derive(Debug, Clone)]
pub struct SetupDb {
    database: DatabaseConfig,
    script_dir: PathBuf,
    replacer: HashMap<String, String>,
    abort_on_error: bool,
}

impl SetupDb {
    /// Create a runner for `database` reading scripts from `script_dir`
    pub fn new(
        database: DatabaseConfig,
        script_dir: impl Into<PathBuf>,
        replacer: HashMap<String, String>,
    ) -> Self {
        Self {
            database,
            script_dir: script_dir.into(),
            replacer,
            abort_on_error: false,
        }
    }

    /// Runner for the product configured in `config`
    pub fn from_config(config: &SetupConfig) -> Self {
        Self::new(
            config.database.clone(),
            config.product_script_dir(),
            config.replacer(),
        )
        .with_abort_on_error(config.setup.abort_on_error)
    }

    /// Stop each script at its first failing statement
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database.path
    }

    /// Location of a product script
    pub fn script_path(&self, kind: ScriptKind) -> PathBuf {
        self.script_dir.join(kind.file_name())
    }

    /// Whether the database file exists
    pub fn database_exists(&self) -> bool {
        self.database.path.exists()
    }

    /// Check whether a table exists in the configured database
    pub fn has_table(&self, name: &str) -> Result<bool> {
        if !self.database_exists() {
            return Ok(false);
        }
        let conn = super::connect(&self.database)?;
        super::has_table(&conn, name)
    }

    /// Run a product script
    pub fn run(&self, kind: ScriptKind, cancel: &CancelToken) -> ScriptReport {
        self.run_file(&self.script_path(kind), kind.as_str(), cancel)
    }

    /// Run an arbitrary script file against the configured database
    pub fn run_file(&self, path: &Path, name: &str, cancel: &CancelToken) -> ScriptReport {
        let mut report = ScriptReport::new(name);

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot read script {}: {}", path.display(), e);
                report.push(
                    ScriptErrorKind::FileNotFound,
                    None,
                    format!("{}: {}", path.display(), e),
                );
                report.aborted = true;
                return report;
            }
        };

        let conn = match super::connect(&self.database) {
            Ok(conn) => conn,
            Err(e) => {
                report.push(ScriptErrorKind::Connection, None, e.to_string());
                report.aborted = true;
                return report;
            }
        };

        let statements = parse_script(&text);
        info!(
            "Running {} ({} statements) against {}",
            name,
            statements.len(),
            self.database.path.display()
        );
        run_statements(
            &conn,
            &statements,
            &self.replacer,
            self.abort_on_error,
            cancel,
            &mut report,
        );

        if report.is_success() {
            info!("{} completed: {} statements", name, report.executed);
        } else {
            warn!(
                "{} finished with {} error(s), {} of {} statements executed",
                name,
                report.errors.len(),
                report.executed,
                report.statements
            );
        }
        report
    }

    /// Create the database and run `create_db`
    ///
    /// Fails (in the report) when the database file already exists.
    pub fn create_database(&self, cancel: &CancelToken) -> ScriptReport {
        if self.database_exists() {
            let mut report = ScriptReport::new(ScriptKind::CreateDatabase.as_str());
            report.push(
                ScriptErrorKind::Execution,
                None,
                format!("Database {} already exists", self.database.path.display()),
            );
            report.aborted = true;
            return report;
        }
        self.run(ScriptKind::CreateDatabase, cancel)
    }

    /// Run `drop_db` and remove the database file
    ///
    /// A missing database is not an error: there is nothing to drop.
    pub fn drop_database(&self, cancel: &CancelToken) -> ScriptReport {
        if !self.database_exists() {
            debug!("Database {} does not exist, nothing to drop", self.database.path.display());
            return ScriptReport::new(ScriptKind::DropDatabase.as_str());
        }

        let mut report = self.run(ScriptKind::DropDatabase, cancel);
        if cancel.is_cancelled() {
            return report;
        }

        let db_path = self.database.path.clone();
        let mut companions = vec![db_path.clone()];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut name = db_path.clone().into_os_string();
            name.push(suffix);
            companions.push(PathBuf::from(name));
        }

        for path in companions.iter().filter(|p| p.exists()) {
            if let Err(e) = fs::remove_file(path) {
                report.push(
                    ScriptErrorKind::Execution,
                    None,
                    format!("Cannot remove {}: {}", path.display(), e),
                );
            }
        }
        info!("Dropped database {}", db_path.display());
        report
    }

    pub fn create_tables(&self, cancel: &CancelToken) -> ScriptReport {
        self.run(ScriptKind::CreateTables, cancel)
    }

    pub fn drop_tables(&self, cancel: &CancelToken) -> ScriptReport {
        self.run(ScriptKind::DropTables, cancel)
    }

    pub fn update_tables(&self, cancel: &CancelToken) -> ScriptReport {
        self.run(ScriptKind::UpdateTables, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> SetupDb {
        let database = DatabaseConfig {
            product: "sqlite".to_string(),
            path: dir.path().join("cms.db"),
            user: "cms".to_string(),
            password: String::new(),
        };
        let mut replacer = HashMap::new();
        replacer.insert("prefix".to_string(), "cms_".to_string());
        SetupDb::new(database, dir.path().join("sqlite"), replacer)
    }

    fn write_script(dir: &TempDir, kind: ScriptKind, text: &str) {
        let folder = dir.path().join("sqlite");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join(kind.file_name()), text).unwrap();
    }

    #[test]
    fn test_parse_skips_comments_and_prompts() {
        let script = "\
# hash comment
-- dash comment
// slash comment
prompt Creating tables
REM oracle style
CREATE TABLE a (
    id INTEGER
);

INSERT INTO a VALUES (1);
";
        let statements = parse_script(script);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a ( id INTEGER )", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn test_parse_trailing_statement_without_semicolon() {
        let statements = parse_script("DROP TABLE a;\nDROP TABLE b");
        assert_eq!(statements, vec!["DROP TABLE a", "DROP TABLE b"]);
    }

    #[test]
    fn test_parse_ignores_empty_statements() {
        assert!(parse_script(";\n  ;\n").is_empty());
    }

    #[test]
    fn test_errors_counted_without_abort() {
        let conn = Connection::open_in_memory().unwrap();
        let statements: Vec<String> = [
            "CREATE TABLE t (x INTEGER)",
            "INSERT INTO missing VALUES (1)",
            "INSERT INTO t VALUES (1)",
            "THIS IS NOT SQL",
            "INSERT INTO t VALUES (2)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut report = ScriptReport::new("test");
        run_statements(
            &conn,
            &statements,
            &HashMap::new(),
            false,
            &CancelToken::new(),
            &mut report,
        );

        assert_eq!(report.statements, 5);
        assert_eq!(report.executed, 3);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.aborted);
        assert!(report.errors.iter().all(|e| e.kind == ScriptErrorKind::Execution));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_abort_on_first_error() {
        let conn = Connection::open_in_memory().unwrap();
        let statements: Vec<String> = [
            "CREATE TABLE t (x INTEGER)",
            "INSERT INTO missing VALUES (1)",
            "INSERT INTO t VALUES (1)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut report = ScriptReport::new("test");
        run_statements(
            &conn,
            &statements,
            &HashMap::new(),
            true,
            &CancelToken::new(),
            &mut report,
        );

        assert_eq!(report.executed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.aborted);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_cancel_stops_run() {
        let conn = Connection::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut report = ScriptReport::new("test");
        run_statements(
            &conn,
            &["CREATE TABLE t (x INTEGER)".to_string()],
            &HashMap::new(),
            false,
            &cancel,
            &mut report,
        );
        assert_eq!(report.executed, 0);
        assert_eq!(report.errors[0].kind, ScriptErrorKind::Cancelled);
    }

    #[test]
    fn test_tokens_substituted_before_execution() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            &dir,
            ScriptKind::CreateTables,
            "CREATE TABLE ${prefix}users (name TEXT);\nCREATE TABLE ${prefix}groups (name TEXT);",
        );
        let db = runner(&dir);

        let report = db.create_tables(&CancelToken::new());
        assert!(report.is_success(), "{:?}", report.errors);
        assert!(db.has_table("cms_users").unwrap());
        assert!(db.has_table("cms_groups").unwrap());
    }

    #[test]
    fn test_missing_script_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let report = runner(&dir).update_tables(&CancelToken::new());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ScriptErrorKind::FileNotFound);
        assert!(report.aborted);
    }

    #[test]
    fn test_create_then_drop_database() {
        let dir = tempfile::tempdir().unwrap();
        write_script(&dir, ScriptKind::CreateDatabase, "PRAGMA user_version = 7;");
        write_script(&dir, ScriptKind::DropDatabase, "PRAGMA user_version = 0;");
        let db = runner(&dir);
        let cancel = CancelToken::new();

        assert!(!db.database_exists());
        assert!(db.create_database(&cancel).is_success());
        assert!(db.database_exists());

        // A second create must not silently reuse the existing database
        let again = db.create_database(&cancel);
        assert_eq!(again.errors.len(), 1);

        assert!(db.drop_database(&cancel).is_success());
        assert!(!db.database_exists());

        // Dropping a missing database is a no-op
        assert!(db.drop_database(&cancel).is_success());
    }

    #[test]
    fn test_script_kind_names() {
        assert_eq!(ScriptKind::parse("create_db"), Some(ScriptKind::CreateDatabase));
        assert_eq!(ScriptKind::parse("drop-tables"), Some(ScriptKind::DropTables));
        assert_eq!(ScriptKind::parse("bogus"), None);
        assert_eq!(ScriptKind::UpdateTables.file_name(), "update_tables.sql");
    }
}
