// src/setup/mod.rs

//! Setup orchestration
//!
//! A setup run prepares the database, writes the connection settings into
//! the server's properties file and imports the selected modules into the
//! content repository:
//!
//! 1. resolve the selected components to module names and order them
//! 2. drop and create the database and its tables, as configured
//! 3. write the database keys into the properties file
//! 4. import the modules in dependency order
//!
//! Each run is recorded in the `setup_runs` table. Nothing is rolled back on
//! failure: a database that was created stays in place when table creation
//! or an import fails.

pub mod update;

use crate::config::SetupConfig;
use crate::db::{ScriptKind, ScriptReport, SetupDb, schema};
use crate::error::{Error, Result};
use crate::modules::{ComponentSet, ImportOutcome, ImportSequencer, ModuleIndex, Repository};
use crate::progress::{CancelToken, Reporter};
use crate::properties::PropertiesFile;
use crate::worker::Worker;
use std::path::Path;
use tracing::{debug, info};

pub use update::{ModuleChange, Update, UpdateOutcome, UpdatePlan};

/// Table whose presence marks an existing installation
const INSTALLATION_MARKER_TABLE: &str = "installed_modules";

/// Everything a setup or update run works from
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub config: SetupConfig,
    pub components: ComponentSet,
    pub modules: ModuleIndex,
}

impl SetupContext {
    /// Load the configuration file and everything it points at
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(SetupConfig::load(config_path)?)
    }

    /// Load components and module folder named by `config`
    pub fn from_config(config: SetupConfig) -> Result<Self> {
        let components = ComponentSet::load(&config.paths.components)?;
        let modules = ModuleIndex::scan(&config.paths.module_dir)?;
        info!(
            "Setup context: {} component(s), {} module(s)",
            components.len(),
            modules.len()
        );
        Ok(Self {
            config,
            components,
            modules,
        })
    }

    /// Script runner for the configured product
    pub fn setup_db(&self) -> SetupDb {
        SetupDb::from_config(&self.config)
    }
}

/// Result of a finished setup
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    /// Modules in the order they were imported
    pub order: Vec<String>,
    pub scripts: Vec<ScriptReport>,
    pub imported: ImportOutcome,
}

impl SetupOutcome {
    /// Script errors that were tolerated (drop steps)
    pub fn warning_count(&self) -> usize {
        let tolerated = [ScriptKind::DropDatabase.as_str(), ScriptKind::DropTables.as_str()];
        self.scripts
            .iter()
            .filter(|r| tolerated.contains(&r.script.as_str()))
            .map(|r| r.errors.len())
            .sum()
    }
}

/// Status recorded in `setup_runs` for a finished run
fn run_status<T>(result: &Result<T>) -> (&'static str, Option<String>) {
    match result {
        Ok(_) => ("finished", None),
        Err(Error::Cancelled) => ("cancelled", None),
        Err(e) => ("failed", Some(e.to_string())),
    }
}

/// Forward the errors of a script run to the reporter
fn report_script(reporter: &Reporter, report: &ScriptReport, tolerated: bool) {
    for error in &report.errors {
        let line = format!("{}: {}", report.script, error);
        if tolerated {
            reporter.warning(line);
        } else {
            reporter.error(line);
        }
    }
    if report.is_success() {
        reporter.line(format!(
            "{}: {} statement(s) executed",
            report.script, report.executed
        ));
    }
}

/// A fresh installation
#[derive(Debug, Clone)]
pub struct Setup {
    context: SetupContext,
    selection: Vec<String>,
}

impl Setup {
    /// Start with the configured components, or the default-checked ones
    pub fn new(context: SetupContext) -> Self {
        let selection = context
            .config
            .setup
            .components
            .clone()
            .unwrap_or_else(|| context.components.default_selection());
        Self { context, selection }
    }

    pub fn context(&self) -> &SetupContext {
        &self.context
    }

    pub fn config(&self) -> &SetupConfig {
        &self.context.config
    }

    /// Replace the component selection
    pub fn select(&mut self, ids: Vec<String>) -> Result<()> {
        self.context.components.resolve_selection(&ids)?;
        self.selection = ids;
        Ok(())
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    /// Names of the modules belonging to the selected components
    pub fn selected_modules(&self) -> Result<Vec<String>> {
        self.context
            .components
            .modules_for(&self.selection, &self.context.modules)
    }

    /// Selected modules in dependency order
    pub fn install_order(&self) -> Result<Vec<String>> {
        self.context.modules.install_order(&self.selected_modules()?)
    }

    /// Run the configured database steps
    ///
    /// Errors of the drop steps are reported as warnings since there may be
    /// nothing to drop. A failing create step ends the setup.
    pub fn prepare_database(
        &self,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<Vec<ScriptReport>> {
        let options = &self.context.config.setup;
        let db = self.context.setup_db();
        let mut reports = Vec::new();

        if options.drop_database {
            reporter.line(format!("Dropping database {}", db.database_path().display()));
            let report = db.drop_database(cancel);
            report_script(reporter, &report, true);
            reports.push(report);
            cancel.check()?;
        }

        if options.create_database {
            reporter.line(format!("Creating database {}", db.database_path().display()));
            let report = db.create_database(cancel);
            report_script(reporter, &report, false);
            cancel.check()?;
            reports.push(report.into_result()?);
        }

        if options.drop_tables {
            reporter.line("Dropping tables");
            let report = db.drop_tables(cancel);
            report_script(reporter, &report, true);
            reports.push(report);
            cancel.check()?;
        }

        if options.create_tables {
            if !options.drop_tables && db.has_table(INSTALLATION_MARKER_TABLE)? {
                reporter.warning(format!(
                    "Database {} already holds an installation",
                    db.database_path().display()
                ));
            }
            reporter.line("Creating tables");
            let report = db.create_tables(cancel);
            report_script(reporter, &report, false);
            cancel.check()?;
            reports.push(report.into_result()?);
        }

        Ok(reports)
    }

    /// Write the database settings into the server's properties file
    ///
    /// A missing properties file is created.
    pub fn save_properties(&self) -> Result<()> {
        let config = &self.context.config;
        let path = &config.paths.properties;

        let mut props = if path.exists() {
            PropertiesFile::load(path)?
        } else {
            debug!("{} does not exist yet, creating it", path.display());
            PropertiesFile::new()
        };

        props.set("db.product", config.database.product.as_str());
        props.set(
            "db.pool.default.url",
            format!("{}:{}", config.database.product, config.database.path.display()),
        );
        props.set("db.pool.default.user", config.database.user.as_str());
        props.set("db.pool.default.password", config.database.password.as_str());
        props.set("wizard.enabled", "false");
        for (key, value) in &config.properties {
            props.set(key.as_str(), value.as_str());
        }

        props.save(path)
    }

    /// Import `order` into the repository
    pub fn import_modules(
        &self,
        repository: &mut Repository,
        order: &[String],
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<ImportOutcome> {
        ImportSequencer::new(&self.context.modules, reporter, cancel).run(repository, order)
    }

    /// Perform the whole setup
    pub fn run(&self, reporter: &Reporter, cancel: &CancelToken) -> Result<SetupOutcome> {
        let order = self.install_order()?;
        reporter.line(format!(
            "Installing {} module(s) for component(s) {}",
            order.len(),
            self.selection.join(", ")
        ));

        let scripts = self.prepare_database(reporter, cancel)?;

        let mut repository = Repository::from_config(&self.context.config)?;
        let run_id = schema::begin_run(repository.connection(), "setup")?;

        let result = self.save_properties().and_then(|()| {
            reporter.line(format!(
                "Saved properties to {}",
                self.context.config.paths.properties.display()
            ));
            self.import_modules(&mut repository, &order, reporter, cancel)
        });

        let (status, message) = run_status(&result);
        let imported_count = result.as_ref().map(|o| o.module_count()).unwrap_or(0);
        schema::finish_run(
            repository.connection(),
            run_id,
            status,
            imported_count,
            message.as_deref(),
        )?;

        let imported = result?;
        reporter.line(format!(
            "Setup finished: {} module(s), {} file(s)",
            imported.module_count(),
            imported.file_count()
        ));
        Ok(SetupOutcome {
            order,
            scripts,
            imported,
        })
    }

    /// Run the setup on a worker thread
    pub fn spawn(self) -> Result<Worker<SetupOutcome>> {
        Worker::spawn("setup", move |reporter, cancel| self.run(&reporter, &cancel))
    }
}
