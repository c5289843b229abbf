// src/modules/mod.rs

//! Module packages and the module folder
//!
//! A module package is a gzip-compressed tarball holding a `manifest.toml`
//! and a `content/` tree:
//!
//! ```text
//! org.example.base-1.2.0.tar.gz
//! ├── manifest.toml
//! └── content/
//!     └── system/modules/org.example.base/...
//! ```
//!
//! ```toml
//! [module]
//! name = "org.example.base"
//! version = "1.2.0"
//! description = "Base templates"
//!
//! [[dependencies]]
//! name = "org.example.core"
//! version = "1.0"
//! ```

pub mod components;
pub mod graph;
pub mod import;

use crate::error::{Error, Result};
use crate::version::ModuleVersion;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub use components::{ComponentSet, SetupComponent};
pub use graph::ModuleGraph;
pub use import::{ImportOutcome, ImportSequencer, InstalledModule, ModuleImporter, Repository};

/// Name of the manifest inside a module package
pub const MANIFEST_NAME: &str = "manifest.toml";

/// Prefix of the entries unpacked into the repository
pub const CONTENT_PREFIX: &str = "content/";

/// Root of `manifest.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub module: ModuleInfo,

    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
}

/// Identity of a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: ModuleVersion,
    #[serde(default)]
    pub description: Option<String>,
}

/// A declared dependency on another module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub name: String,
    /// Minimum required version
    #[serde(default)]
    pub version: Option<ModuleVersion>,
}

impl ModuleManifest {
    /// Parse manifest text
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: ModuleManifest = toml::from_str(content)?;
        if manifest.module.name.trim().is_empty() {
            return Err(Error::ParseError("Module name must not be empty".to_string()));
        }
        if manifest.dependencies.iter().any(|d| d.name == manifest.module.name) {
            return Err(Error::ParseError(format!(
                "Module {} depends on itself",
                manifest.module.name
            )));
        }
        Ok(manifest)
    }
}

/// A module package file in the module folder
#[derive(Debug, Clone)]
pub struct ModulePackage {
    path: PathBuf,
    manifest: ModuleManifest,
}

impl ModulePackage {
    /// Open a package and read its manifest
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let mut archive = Archive::new(GzDecoder::new(file));

        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.to_string_lossy().to_string();
            let entry_path = entry_path.trim_start_matches("./");

            if entry_path == MANIFEST_NAME {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                let manifest = ModuleManifest::parse(&content).map_err(|e| {
                    Error::ParseError(format!("Invalid manifest in {}: {}", path.display(), e))
                })?;
                debug!(
                    "Read module {} v{} from {}",
                    manifest.module.name,
                    manifest.module.version,
                    path.display()
                );
                return Ok(Self {
                    path: path.to_path_buf(),
                    manifest,
                });
            }
        }

        Err(Error::ParseError(format!(
            "Module package {} has no {}",
            path.display(),
            MANIFEST_NAME
        )))
    }

    pub fn name(&self) -> &str {
        &self.manifest.module.name
    }

    pub fn version(&self) -> &ModuleVersion {
        &self.manifest.module.version
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.module.description.as_deref()
    }

    pub fn dependencies(&self) -> &[ModuleDependency] {
        &self.manifest.dependencies
    }

    /// Names of the modules this module depends on
    pub fn dependency_names(&self) -> Vec<&str> {
        self.manifest
            .dependencies
            .iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }
}

fn is_package_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// All module packages available in the module folder, by module name
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    packages: BTreeMap<String, ModulePackage>,
}

impl ModuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every package in `dir`
    ///
    /// When two packages carry the same module, the higher version wins.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::FileNotFound(format!(
                "Module folder {} does not exist",
                dir.display()
            )));
        }

        let mut index = Self::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
            if !entry.file_type().is_file() || !is_package_file(entry.path()) {
                continue;
            }
            let package = ModulePackage::open(entry.path())?;
            index.insert(package);
        }

        debug!("Found {} module(s) in {}", index.len(), dir.display());
        Ok(index)
    }

    /// Add a package, keeping the higher version on a name clash
    pub fn insert(&mut self, package: ModulePackage) {
        if let Some(existing) = self.packages.get(package.name()) {
            if existing.version() >= package.version() {
                warn!(
                    "Ignoring {} ({} v{}): {} v{} already present",
                    package.path().display(),
                    package.name(),
                    package.version(),
                    existing.path().display(),
                    existing.version()
                );
                return;
            }
            warn!(
                "Replacing {} v{} with newer {}",
                existing.name(),
                existing.version(),
                package.path().display()
            );
        }
        self.packages.insert(package.name().to_string(), package);
    }

    pub fn get(&self, name: &str) -> Option<&ModulePackage> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Module names in alphabetical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn packages(&self) -> impl Iterator<Item = &ModulePackage> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Build the dependency graph for `names`
    ///
    /// Dependencies outside the set are not ordered (they are expected to be
    /// installed already) but a dependency inside the set whose packaged
    /// version is older than required is an error.
    pub fn graph_for(&self, names: &[String]) -> Result<ModuleGraph> {
        let mut graph = ModuleGraph::new();

        for name in names {
            let package = self
                .get(name)
                .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;

            let mut deps = Vec::new();
            for dep in package.dependencies() {
                if !names.contains(&dep.name) {
                    debug!("{}: dependency {} is outside the install set", name, dep.name);
                    continue;
                }
                if let (Some(required), Some(available)) = (&dep.version, self.get(&dep.name)) {
                    if available.version() < required {
                        return Err(Error::Config(format!(
                            "{} requires {} >= {}, but only v{} is available",
                            name,
                            dep.name,
                            required,
                            available.version()
                        )));
                    }
                }
                deps.push(dep.name.as_str());
            }
            graph.add_module(name, &deps);
        }

        Ok(graph)
    }

    /// Install order for `names`, dependencies first
    pub fn install_order(&self, names: &[String]) -> Result<Vec<String>> {
        self.graph_for(names)?.install_order()
    }

    /// Packaged modules that `name` needs, or that need `name` when `reverse` is set
    pub fn related(&self, name: &str, reverse: bool) -> Result<BTreeSet<String>> {
        if !self.contains(name) {
            return Err(Error::ModuleNotFound(name.to_string()));
        }
        let names: Vec<String> = self.names().map(str::to_string).collect();
        let graph = self.graph_for(&names)?;
        Ok(if reverse {
            graph.transitive_dependents(name)
        } else {
            graph.transitive_dependencies(name)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::write_package;
    use super::*;

    #[test]
    fn test_manifest_parse() {
        let manifest = ModuleManifest::parse(
            "[module]\nname = \"a\"\nversion = \"1.0\"\n\n[[dependencies]]\nname = \"b\"\nversion = \"2.1\"\n",
        )
        .unwrap();
        assert_eq!(manifest.module.name, "a");
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(
            manifest.dependencies[0].version,
            Some(ModuleVersion::parse("2.1").unwrap())
        );
    }

    #[test]
    fn test_manifest_rejects_self_dependency() {
        let result = ModuleManifest::parse(
            "[module]\nname = \"a\"\nversion = \"1.0\"\n\n[[dependencies]]\nname = \"a\"\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_open_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_package(dir.path(), "org.example.base", "1.2.0", &["org.example.core"], &[]);

        let package = ModulePackage::open(&path).unwrap();
        assert_eq!(package.name(), "org.example.base");
        assert_eq!(package.version().to_string(), "1.2.0");
        assert_eq!(package.dependency_names(), vec!["org.example.core"]);
        assert_eq!(package.description(), Some("Test module org.example.base"));
    }

    #[test]
    fn test_scan_keeps_newest_version() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", "1.0.0", &[], &[]);
        write_package(dir.path(), "a", "1.1.0", &[], &[]);
        write_package(dir.path(), "b", "2.0.0", &["a"], &[]);
        std::fs::write(dir.path().join("README.txt"), "not a module").unwrap();

        let index = ModuleIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap().version().to_string(), "1.1.0");
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_scan_missing_folder() {
        assert!(matches!(
            ModuleIndex::scan("/nonexistent/modules"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_install_order_ignores_outside_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", "1.0.0", &["external"], &[]);
        write_package(dir.path(), "c", "1.0.0", &["a", "b"], &[]);
        write_package(dir.path(), "b", "1.0.0", &["a"], &[]);

        let index = ModuleIndex::scan(dir.path()).unwrap();
        let names = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(index.install_order(&names).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_related_modules() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "core", "1.0.0", &[], &[]);
        write_package(dir.path(), "base", "1.0.0", &["core"], &[]);
        write_package(dir.path(), "site", "1.0.0", &["base", "external"], &[]);
        write_package(dir.path(), "extra", "1.0.0", &[], &[]);

        let index = ModuleIndex::scan(dir.path()).unwrap();
        let needs: Vec<String> = index.related("site", false).unwrap().into_iter().collect();
        assert_eq!(needs, vec!["base", "core"]);
        let needed_by: Vec<String> = index.related("core", true).unwrap().into_iter().collect();
        assert_eq!(needed_by, vec!["base", "site"]);
        assert!(index.related("extra", true).unwrap().is_empty());
        assert!(matches!(index.related("ghost", false), Err(Error::ModuleNotFound(_))));
    }

    #[test]
    fn test_install_order_unknown_module() {
        let index = ModuleIndex::new();
        let result = index.install_order(&["ghost".to_string()]);
        assert!(matches!(result, Err(Error::ModuleNotFound(_))));
    }
}
