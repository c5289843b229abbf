// src/setup/update.rs

//! Updating an existing installation
//!
//! An update compares the module folder with the modules recorded in the
//! repository. A module is imported again when its package is newer than
//! the recorded version; a module that was never imported is installed only
//! when one of the selected components contains it.

use super::{Setup, SetupContext, report_script, run_status};
use crate::db::schema;
use crate::error::Result;
use crate::modules::{ImportOutcome, ModuleImporter, Repository};
use crate::progress::{CancelToken, Reporter};
use crate::properties::PropertiesFile;
use crate::version::ModuleVersion;
use crate::worker::Worker;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Properties key holding the time of the last update
pub const LAST_UPDATE_KEY: &str = "setup.last_update";

/// One module the update will import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleChange {
    pub name: String,
    /// Recorded version; `None` for a new module
    pub installed: Option<ModuleVersion>,
    pub available: ModuleVersion,
}

impl ModuleChange {
    pub fn is_new(&self) -> bool {
        self.installed.is_none()
    }
}

/// Modules an update will import, alphabetically
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub changes: Vec<ModuleChange>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.name.clone()).collect()
    }

    /// Modules that replace an older recorded version
    pub fn outdated(&self) -> impl Iterator<Item = &ModuleChange> {
        self.changes.iter().filter(|c| !c.is_new())
    }
}

/// Result of a finished update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub plan: UpdatePlan,
    pub order: Vec<String>,
    pub imported: ImportOutcome,
}

/// An update of an existing installation
#[derive(Debug, Clone)]
pub struct Update {
    setup: Setup,
}

impl Update {
    pub fn new(context: SetupContext) -> Self {
        Self {
            setup: Setup::new(context),
        }
    }

    /// Replace the component selection used for new modules
    pub fn select(&mut self, ids: Vec<String>) -> Result<()> {
        self.setup.select(ids)
    }

    pub fn context(&self) -> &SetupContext {
        self.setup.context()
    }

    /// Decide which modules to import
    pub fn plan<I: ModuleImporter>(&self, importer: &I) -> Result<UpdatePlan> {
        let installed: HashMap<String, ModuleVersion> = importer
            .installed()?
            .into_iter()
            .map(|m| (m.name, m.version))
            .collect();
        let selected: BTreeSet<String> = self.setup.selected_modules()?.into_iter().collect();

        let mut plan = UpdatePlan::default();
        for package in self.context().modules.packages() {
            let name = package.name();
            let change = match installed.get(name) {
                Some(current) if package.version() > current => Some(ModuleChange {
                    name: name.to_string(),
                    installed: Some(current.clone()),
                    available: package.version().clone(),
                }),
                Some(current) => {
                    debug!("{} v{} is up to date", name, current);
                    None
                }
                None if selected.contains(name) => Some(ModuleChange {
                    name: name.to_string(),
                    installed: None,
                    available: package.version().clone(),
                }),
                None => None,
            };
            plan.changes.extend(change);
        }

        Ok(plan)
    }

    fn record_update_time(&self) -> Result<()> {
        let path = &self.context().config.paths.properties;
        let mut props = PropertiesFile::load(path)?;
        props.set(LAST_UPDATE_KEY, chrono::Utc::now().to_rfc3339());
        props.save(path)
    }

    fn apply(
        &self,
        repository: &mut Repository,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<UpdateOutcome> {
        let plan = self.plan(&*repository)?;
        if plan.is_empty() {
            reporter.line("All modules are up to date");
        } else {
            let outdated = plan.outdated().count();
            reporter.line(format!(
                "{} module(s) to update, {} new",
                outdated,
                plan.changes.len() - outdated
            ));
        }
        for change in &plan.changes {
            match &change.installed {
                Some(old) => reporter.line(format!(
                    "{}: v{} -> v{}",
                    change.name, old, change.available
                )),
                None => reporter.line(format!("{}: new v{}", change.name, change.available)),
            }
        }

        let order = self.context().modules.install_order(&plan.names())?;

        if self.context().config.setup.update_tables {
            reporter.line("Updating tables");
            let report = self.context().setup_db().update_tables(cancel);
            report_script(reporter, &report, false);
            cancel.check()?;
            report.into_result()?;
        }

        // Each record is replaced only when its module imports successfully
        let imported = self.setup.import_modules(repository, &order, reporter, cancel)?;
        self.record_update_time()?;

        Ok(UpdateOutcome {
            plan,
            order,
            imported,
        })
    }

    /// Perform the whole update
    pub fn run(&self, reporter: &Reporter, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let mut repository = Repository::from_config(&self.context().config)?;
        let run_id = schema::begin_run(repository.connection(), "update")?;

        let result = self.apply(&mut repository, reporter, cancel);

        let (status, message) = run_status(&result);
        let count = result.as_ref().map(|o| o.imported.module_count()).unwrap_or(0);
        schema::finish_run(repository.connection(), run_id, status, count, message.as_deref())?;

        let outcome = result?;
        info!("Update finished: {} module(s) imported", count);
        reporter.line(format!(
            "Update finished: {} module(s) imported",
            outcome.imported.module_count()
        ));
        Ok(outcome)
    }

    /// Run the update on a worker thread
    pub fn spawn(self) -> Result<Worker<UpdateOutcome>> {
        Worker::spawn("update", move |reporter, cancel| self.run(&reporter, &cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::modules::test_support::write_package;
    use std::fs;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> SetupContext {
        let root = dir.path();
        let scripts = root.join("database/sqlite");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(
            scripts.join("update_tables.sql"),
            "CREATE TABLE IF NOT EXISTS cms_log (id INTEGER PRIMARY KEY);\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("modules")).unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/cms.properties"), "# server\nwizard.enabled=false\n").unwrap();
        fs::write(
            root.join("components.properties"),
            "components=base,extra\n\
             component.base.modules=base\\..*\n\
             component.base.checked=true\n\
             component.extra.modules=extra\\..*\n",
        )
        .unwrap();
        fs::write(
            root.join("setup.toml"),
            "[database]\npath = \"cms.db\"\n\n\
             [paths]\nscript_dir = \"database\"\nmodule_dir = \"modules\"\n\
             components = \"components.properties\"\nproperties = \"config/cms.properties\"\n\
             repository = \"repository\"\n\n\
             [setup]\nupdate_tables = true\n",
        )
        .unwrap();
        SetupContext::load(root.join("setup.toml")).unwrap()
    }

    fn import(context: &SetupContext, names: &[&str]) {
        let mut repo = Repository::from_config(&context.config).unwrap();
        for name in names {
            repo.import(context.modules.get(name).unwrap()).unwrap();
        }
    }

    #[test]
    fn test_plan_newer_and_selected() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_package(&modules, "base.core", "1.0", &[], &[]);
        write_package(&modules, "base.ui", "1.0", &[], &[]);
        write_package(&modules, "extra.old", "1.0", &[], &[]);
        import(&context(&dir), &["base.core", "base.ui", "extra.old"]);

        write_package(&modules, "base.core", "1.1", &[], &[]);
        write_package(&modules, "base.new", "1.0", &[], &[]);
        write_package(&modules, "extra.new", "1.0", &[], &[]);
        let update = Update::new(context(&dir));

        let repo = Repository::from_config(&update.context().config).unwrap();
        let plan = update.plan(&repo).unwrap();
        assert_eq!(plan.names(), vec!["base.core", "base.new"]);
        assert_eq!(
            plan.changes[0].installed,
            Some(ModuleVersion::parse("1.0").unwrap())
        );
        assert!(plan.changes[1].is_new());
        assert_eq!(plan.outdated().count(), 1);
    }

    #[test]
    fn test_run_imports_and_records_time() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_package(&modules, "base.core", "1.0", &[], &[("f.txt", "v1")]);
        import(&context(&dir), &["base.core"]);

        write_package(&modules, "base.core", "2.0", &[], &[("f.txt", "v2")]);
        write_package(&modules, "base.ui", "1.0", &["base.core"], &[]);
        let update = Update::new(context(&dir));

        let outcome = update
            .run(&Reporter::log_only("update"), &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.order, vec!["base.core", "base.ui"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("repository/f.txt")).unwrap(),
            "v2"
        );

        let props = PropertiesFile::load(dir.path().join("config/cms.properties")).unwrap();
        assert!(props.get(LAST_UPDATE_KEY).is_some());
        assert_eq!(props.get("wizard.enabled"), Some("false"));

        let repo = Repository::from_config(&update.context().config).unwrap();
        assert!(schema::last_finished_run(repo.connection(), "update").unwrap().is_some());
        assert!(repo.connection().prepare("SELECT id FROM cms_log").is_ok());
    }

    #[test]
    fn test_failed_import_keeps_records() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_package(&modules, "base.core", "1.0", &[], &[]);
        write_package(&modules, "extra.old", "1.0", &[], &[]);
        import(&context(&dir), &["base.core", "extra.old"]);

        // A file where base.core needs a folder makes its import fail
        write_package(&modules, "base.core", "1.1", &[], &[("blocked/f.txt", "x")]);
        write_package(&modules, "extra.old", "1.1", &[], &[]);
        fs::write(dir.path().join("repository/blocked"), "in the way").unwrap();

        let update = Update::new(context(&dir));
        let result = update.run(&Reporter::log_only("update"), &CancelToken::new());
        assert!(matches!(result, Err(Error::ImportFailed { ref module, .. }) if module == "base.core"));

        let repo = Repository::from_config(&update.context().config).unwrap();
        let installed: Vec<(String, String)> = repo
            .installed()
            .unwrap()
            .into_iter()
            .map(|m| (m.name, m.version.to_string()))
            .collect();
        assert_eq!(
            installed,
            vec![
                ("base.core".to_string(), "1.0".to_string()),
                ("extra.old".to_string(), "1.0".to_string()),
            ]
        );

        // The next update still sees both modules as outdated
        let plan = update.plan(&repo).unwrap();
        assert_eq!(plan.names(), vec!["base.core", "extra.old"]);
    }

    #[test]
    fn test_nothing_to_update() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        fs::create_dir_all(&modules).unwrap();
        write_package(&modules, "base.core", "1.0", &[], &[]);
        let context = context(&dir);
        import(&context, &["base.core"]);

        let mut worker = Update::new(context).spawn().unwrap();
        let outcome = worker.join().unwrap();
        assert!(outcome.plan.is_empty());
        assert_eq!(outcome.imported.module_count(), 0);
        assert!(
            worker
                .log()
                .lines()
                .iter()
                .any(|l| l.text == "All modules are up to date")
        );
    }
}
