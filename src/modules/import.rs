// src/modules/import.rs

//! Importing module packages into the content repository
//!
//! The [`ModuleImporter`] trait is the seam between install ordering and the
//! actual import. [`Repository`] is the real implementation: it unpacks the
//! `content/` tree of a package below the repository root and records the
//! imported version in the `installed_modules` table. [`ImportSequencer`]
//! walks an install order, reporting progress and honouring cancellation
//! between modules.

use super::{CONTENT_PREFIX, ModuleIndex, ModulePackage};
use crate::config::SetupConfig;
use crate::db::{self, schema};
use crate::error::{Error, Result};
use crate::progress::{CancelToken, Reporter};
use crate::version::ModuleVersion;
use flate2::read::GzDecoder;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info, warn};

/// A module recorded as imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub name: String,
    pub version: ModuleVersion,
    pub description: Option<String>,
    pub package_file: String,
    pub file_count: usize,
    pub imported_at: String,
}

type ModuleRow = (String, String, Option<String>, String, i64, String);

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<ModuleRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

impl TryFrom<ModuleRow> for InstalledModule {
    type Error = Error;

    fn try_from(row: ModuleRow) -> Result<Self> {
        let (name, version, description, package_file, file_count, imported_at) = row;
        Ok(Self {
            name,
            version: ModuleVersion::parse(&version)?,
            description,
            package_file,
            file_count: file_count.max(0) as usize,
            imported_at,
        })
    }
}

/// Something modules can be imported into
pub trait ModuleImporter {
    /// Import one package, replacing an earlier import of the same module
    fn import(&mut self, package: &ModulePackage) -> Result<InstalledModule>;

    /// Every recorded module, by name
    fn installed(&self) -> Result<Vec<InstalledModule>>;
}

/// Map a package entry to its path below the repository root
///
/// Returns `None` for entries outside `content/` and for the `content/`
/// directory itself. Parent components are rejected and leading slashes
/// stripped.
pub fn content_path(entry_path: &str) -> Result<Option<PathBuf>> {
    let entry_path = entry_path.trim_start_matches("./");
    let Some(relative) = entry_path.strip_prefix(CONTENT_PREFIX) else {
        return Ok(None);
    };

    let mut normalized = PathBuf::new();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::PathTraversal(entry_path.to_string())),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(normalized))
}

/// The content repository: a folder tree plus bookkeeping tables
pub struct Repository {
    root: PathBuf,
    conn: Connection,
}

impl Repository {
    /// Use `conn` for bookkeeping and `root` for module content
    pub fn open(root: impl Into<PathBuf>, conn: Connection) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        schema::migrate(&conn)?;
        Ok(Self { root, conn })
    }

    /// Open the repository named by the setup configuration
    pub fn from_config(config: &SetupConfig) -> Result<Self> {
        let conn = db::connect(&config.database)?;
        Self::open(config.paths.repository.clone(), conn)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Look up one imported module
    pub fn installed_module(&self, name: &str) -> Result<Option<InstalledModule>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, version, description, package_file, file_count, imported_at
                 FROM installed_modules WHERE name = ?1",
                [name],
                read_row,
            )
            .optional()?;

        row.map(InstalledModule::try_from).transpose()
    }

    fn unpack(&self, package: &ModulePackage) -> Result<usize> {
        let file = File::open(package.path())?;
        let mut archive = Archive::new(GzDecoder::new(file));
        let mut count = 0;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.to_string_lossy().to_string();
            let Some(relative) = content_path(&entry_path)? else {
                continue;
            };
            let target = self.root.join(&relative);

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if !entry_type.is_file() {
                warn!(
                    "{}: skipping {} (unsupported entry type)",
                    package.name(),
                    entry_path
                );
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            count += 1;
        }

        Ok(count)
    }
}

impl ModuleImporter for Repository {
    fn import(&mut self, package: &ModulePackage) -> Result<InstalledModule> {
        let file_count = self.unpack(package).map_err(|e| Error::ImportFailed {
            module: package.name().to_string(),
            reason: e.to_string(),
        })?;

        let module = InstalledModule {
            name: package.name().to_string(),
            version: package.version().clone(),
            description: package.description().map(str::to_string),
            package_file: package
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_count,
            imported_at: chrono::Utc::now().to_rfc3339(),
        };

        self.conn.execute(
            "INSERT INTO installed_modules
                (name, version, description, package_file, file_count, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO UPDATE SET
                version = excluded.version,
                description = excluded.description,
                package_file = excluded.package_file,
                file_count = excluded.file_count,
                imported_at = excluded.imported_at",
            params![
                module.name,
                module.version.to_string(),
                module.description,
                module.package_file,
                module.file_count as i64,
                module.imported_at,
            ],
        )?;

        debug!(
            "Imported {} v{} ({} files)",
            module.name, module.version, module.file_count
        );
        Ok(module)
    }

    fn installed(&self) -> Result<Vec<InstalledModule>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, description, package_file, file_count, imported_at
             FROM installed_modules ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(InstalledModule::try_from).collect()
    }
}

/// Result of importing an install order
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub imported: Vec<InstalledModule>,
}

impl ImportOutcome {
    pub fn module_count(&self) -> usize {
        self.imported.len()
    }

    pub fn file_count(&self) -> usize {
        self.imported.iter().map(|m| m.file_count).sum()
    }
}

/// Imports modules one after another in install order
pub struct ImportSequencer<'a> {
    index: &'a ModuleIndex,
    reporter: &'a Reporter,
    cancel: &'a CancelToken,
}

impl<'a> ImportSequencer<'a> {
    pub fn new(index: &'a ModuleIndex, reporter: &'a Reporter, cancel: &'a CancelToken) -> Self {
        Self {
            index,
            reporter,
            cancel,
        }
    }

    /// Import every module of `order`
    ///
    /// Stops at the first failing module; modules imported before it stay
    /// imported. Cancellation is checked before each module.
    pub fn run<I: ModuleImporter>(&self, importer: &mut I, order: &[String]) -> Result<ImportOutcome> {
        let total = order.len() as u64;
        let mut outcome = ImportOutcome::default();

        for (i, name) in order.iter().enumerate() {
            self.cancel.check()?;

            let package = self
                .index
                .get(name)
                .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;

            self.reporter.position(i as u64, total);
            self.reporter.line(format!(
                "Importing module {} v{} ({}/{})",
                name,
                package.version(),
                i + 1,
                total
            ));

            match importer.import(package) {
                Ok(module) => {
                    self.reporter
                        .line(format!("  {} file(s) imported", module.file_count));
                    outcome.imported.push(module);
                }
                Err(e) => {
                    self.reporter.error(format!("Import of {} failed: {}", name, e));
                    return Err(match e {
                        Error::ImportFailed { .. } => e,
                        other => Error::ImportFailed {
                            module: name.clone(),
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }

        self.reporter.position(total, total);
        info!(
            "Imported {} module(s), {} file(s)",
            outcome.module_count(),
            outcome.file_count()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::write_package;
    use super::*;
    use crate::progress::ReportLog;

    fn repository(root: &Path) -> Repository {
        Repository::open(root.join("repo"), Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_content_path() {
        assert_eq!(
            content_path("content/system/a.txt").unwrap(),
            Some(PathBuf::from("system/a.txt"))
        );
        assert_eq!(
            content_path("./content/./b/c").unwrap(),
            Some(PathBuf::from("b/c"))
        );
        assert_eq!(content_path("manifest.toml").unwrap(), None);
        assert_eq!(content_path("content/").unwrap(), None);
        assert!(matches!(
            content_path("content/../../etc/passwd"),
            Err(Error::PathTraversal(_))
        ));
        assert!(content_path("content/a/../../b").is_err());
    }

    #[test]
    fn test_import_unpacks_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_package(
            dir.path(),
            "org.example.base",
            "1.0",
            &[],
            &[("system/base/a.txt", "alpha"), ("system/base/sub/b.txt", "beta")],
        );
        let package = ModulePackage::open(path).unwrap();
        let mut repo = repository(dir.path());

        let module = repo.import(&package).unwrap();
        assert_eq!(module.file_count, 2);
        assert_eq!(module.package_file, "org.example.base-1.0.tar.gz");
        assert_eq!(
            fs::read_to_string(repo.root().join("system/base/sub/b.txt")).unwrap(),
            "beta"
        );

        let recorded = repo.installed_module("org.example.base").unwrap().unwrap();
        assert_eq!(recorded.version.to_string(), "1.0");
        assert_eq!(recorded.file_count, 2);
    }

    #[test]
    fn test_reimport_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let packages = tempfile::tempdir().unwrap();
        let old = write_package(packages.path(), "m", "1.0", &[], &[("f.txt", "old")]);
        let mut repo = repository(dir.path());
        repo.import(&ModulePackage::open(old).unwrap()).unwrap();

        let new = write_package(packages.path(), "m", "1.1", &[], &[("f.txt", "new")]);
        repo.import(&ModulePackage::open(new).unwrap()).unwrap();

        let installed = repo.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version.to_string(), "1.1");
        assert_eq!(fs::read_to_string(repo.root().join("f.txt")).unwrap(), "new");
    }

    #[test]
    fn test_sequencer_imports_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_package(&modules, "a", "1.0", &[], &[("a.txt", "a")]);
        write_package(&modules, "b", "1.0", &["a"], &[("b.txt", "b")]);
        let index = ModuleIndex::scan(&modules).unwrap();
        let order = index
            .install_order(&["b".to_string(), "a".to_string()])
            .unwrap();

        let (reporter, receiver) = Reporter::channel("import");
        let cancel = CancelToken::new();
        let mut repo = repository(dir.path());

        let outcome = ImportSequencer::new(&index, &reporter, &cancel)
            .run(&mut repo, &order)
            .unwrap();
        assert_eq!(outcome.module_count(), 2);
        assert_eq!(outcome.file_count(), 2);
        assert_eq!(outcome.imported[0].name, "a");

        let mut log = ReportLog::new();
        log.drain(&receiver);
        assert_eq!(log.position(), (2, 2));
        assert!(log.lines()[0].text.starts_with("Importing module a v1.0 (1/2)"));
    }

    #[test]
    fn test_sequencer_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", "1.0", &[], &[]);
        let index = ModuleIndex::scan(dir.path()).unwrap();

        let reporter = Reporter::log_only("import");
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut repo = repository(dir.path());

        let result = ImportSequencer::new(&index, &reporter, &cancel).run(&mut repo, &["a".to_string()]);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(repo.installed().unwrap().is_empty());
    }

    struct FailingImporter {
        fail_on: &'static str,
        imported: Vec<String>,
    }

    impl ModuleImporter for FailingImporter {
        fn import(&mut self, package: &ModulePackage) -> Result<InstalledModule> {
            if package.name() == self.fail_on {
                return Err(Error::IoError("disk full".to_string()));
            }
            self.imported.push(package.name().to_string());
            Ok(InstalledModule {
                name: package.name().to_string(),
                version: package.version().clone(),
                description: None,
                package_file: String::new(),
                file_count: 0,
                imported_at: String::new(),
            })
        }

        fn installed(&self) -> Result<Vec<InstalledModule>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_sequencer_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", "1.0", &[], &[]);
        write_package(dir.path(), "b", "1.0", &[], &[]);
        write_package(dir.path(), "c", "1.0", &[], &[]);
        let index = ModuleIndex::scan(dir.path()).unwrap();

        let reporter = Reporter::log_only("import");
        let cancel = CancelToken::new();
        let mut importer = FailingImporter {
            fail_on: "b",
            imported: Vec::new(),
        };
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let err = ImportSequencer::new(&index, &reporter, &cancel)
            .run(&mut importer, &order)
            .unwrap_err();
        match err {
            Error::ImportFailed { module, reason } => {
                assert_eq!(module, "b");
                assert!(reason.contains("disk full"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(importer.imported, vec!["a"]);
    }
}
