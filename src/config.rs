// src/config.rs

//! Setup configuration (`setup.toml`)
//!
//! The configuration names the database to prepare, where scripts, module
//! packages and the component definitions live, which setup steps to run,
//! and which `${token}` values the database scripts receive. Relative paths
//! are resolved against the directory that contains the configuration file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "setup.toml";

/// Database products with a script folder; only SQLite can be connected to
pub const SUPPORTED_PRODUCTS: &[&str] = &["sqlite"];

/// Complete setup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    pub database: DatabaseConfig,

    pub paths: PathsConfig,

    #[serde(default)]
    pub setup: SetupOptions,

    /// Extra `${token}` values for database scripts (keys without `${}`)
    #[serde(default)]
    pub replacer: HashMap<String, String>,

    /// Extra keys written into the properties file after setup
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Product name; selects the script folder under `paths.script_dir`
    #[serde(default = "default_product")]
    pub product: String,

    /// Path of the database file
    pub path: PathBuf,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,
}

fn default_product() -> String {
    "sqlite".to_string()
}

/// File system locations used by setup and update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-product script folders
    pub script_dir: PathBuf,

    /// Folder holding the module packages (`*.tar.gz`)
    pub module_dir: PathBuf,

    /// Component definitions (`components.properties`)
    pub components: PathBuf,

    /// Main server properties file rewritten by setup
    pub properties: PathBuf,

    /// Content repository root that module content is unpacked into
    pub repository: PathBuf,

    /// Site store file
    #[serde(default = "default_sites")]
    pub sites: PathBuf,
}

fn default_sites() -> PathBuf {
    PathBuf::from("sites.toml")
}

/// Which setup steps to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupOptions {
    #[serde(default)]
    pub drop_database: bool,

    #[serde(default = "default_true")]
    pub create_database: bool,

    #[serde(default)]
    pub drop_tables: bool,

    #[serde(default = "default_true")]
    pub create_tables: bool,

    /// Stop a script at its first failing statement
    #[serde(default)]
    pub abort_on_error: bool,

    /// Components to install; the default-checked components when absent
    #[serde(default)]
    pub components: Option<Vec<String>>,

    /// Run the `update_tables` script during update
    #[serde(default)]
    pub update_tables: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            drop_database: false,
            create_database: true,
            drop_tables: false,
            create_tables: true,
            abort_on_error: false,
            components: None,
            update_tables: false,
        }
    }
}

impl SetupConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base);
        debug!("Loaded setup configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text (paths left as written)
    pub fn parse(content: &str) -> Result<Self> {
        let config: SetupConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.database.path);
        resolve(&mut self.paths.script_dir);
        resolve(&mut self.paths.module_dir);
        resolve(&mut self.paths.components);
        resolve(&mut self.paths.properties);
        resolve(&mut self.paths.repository);
        resolve(&mut self.paths.sites);
    }

    fn validate(&self) -> Result<()> {
        if self.database.product.trim().is_empty() {
            return Err(Error::Config("database.product must not be empty".to_string()));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Config("database.path must not be empty".to_string()));
        }
        if self.setup.drop_tables && !self.setup.create_tables {
            warn!("setup.drop_tables is set without setup.create_tables");
        }
        Ok(())
    }

    /// Folder holding the scripts for the configured product
    pub fn product_script_dir(&self) -> PathBuf {
        self.paths.script_dir.join(&self.database.product)
    }

    /// Token values passed to database scripts
    ///
    /// `database`, `user` and `password` default to the connection settings;
    /// entries in `[replacer]` take precedence.
    pub fn replacer(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "database".to_string(),
            self.database.path.display().to_string(),
        );
        map.insert("user".to_string(), self.database.user.clone());
        map.insert("password".to_string(), self.database.password.clone());
        for (key, value) in &self.replacer {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}
