// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use cms_setup::SetupContext;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tempfile::TempDir;

pub const CREATE_TABLES: &str = "\
-- Core tables
CREATE TABLE cms_resources (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    owner TEXT DEFAULT '${user}'
);

CREATE TABLE cms_projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
INSERT INTO cms_projects (name) VALUES ('Online');
";

pub const PROPERTIES: &str = "\
# Server configuration
#
# Database settings are written by the setup.

db.product=none
db.pool.default.url=
wizard.enabled=true

# Caches
cache.size = 1024
cache.paths = /system/,\\
    /sites/
";

/// A scratch installation: scripts, components, module folder and configuration
pub struct TestInstall {
    pub dir: TempDir,
}

impl TestInstall {
    /// Create the tree with the default components `base` (checked) and `demo`
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let scripts = root.join("setup/database/sqlite");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("create_db.sql"), "PRAGMA user_version = 1;\n").unwrap();
        fs::write(scripts.join("drop_db.sql"), "# file is removed after this script\n").unwrap();
        fs::write(scripts.join("create_tables.sql"), CREATE_TABLES).unwrap();
        fs::write(
            scripts.join("drop_tables.sql"),
            "DROP TABLE cms_resources;\nDROP TABLE cms_projects;\n",
        )
        .unwrap();
        fs::write(
            scripts.join("update_tables.sql"),
            "CREATE TABLE IF NOT EXISTS cms_log (id INTEGER PRIMARY KEY, entry TEXT);\n",
        )
        .unwrap();

        fs::create_dir_all(root.join("setup/modules")).unwrap();
        fs::write(
            root.join("setup/components.properties"),
            "\
components=base,demo

component.base.name=Base system
component.base.modules=org\\.cms\\.(core|base|workplace)
component.base.position=10
component.base.checked=true

component.demo.name=Demo
component.demo.modules=org\\.cms\\.demo.*
component.demo.dependencies=base
component.demo.position=20
",
        )
        .unwrap();

        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/cms.properties"), PROPERTIES).unwrap();

        let install = Self { dir };
        install.write_config("");
        install
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Rewrite `setup.toml`, appending `extra` TOML
    pub fn write_config(&self, extra: &str) {
        fs::write(
            self.config_path(),
            format!(
                "\
[database]
path = \"data/cms.db\"
user = \"cmsuser\"

[paths]
script_dir = \"setup/database\"
module_dir = \"setup/modules\"
components = \"setup/components.properties\"
properties = \"config/cms.properties\"
repository = \"repository\"
sites = \"config/sites.toml\"

{}",
                extra
            ),
        )
        .unwrap();
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("setup.toml")
    }

    pub fn context(&self) -> SetupContext {
        SetupContext::load(self.config_path()).unwrap()
    }

    pub fn properties_path(&self) -> PathBuf {
        self.root().join("config/cms.properties")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root().join("data/cms.db")
    }

    /// Write a module package into the module folder
    pub fn add_module(&self, name: &str, version: &str, deps: &[&str], files: &[(&str, &str)]) {
        write_package(&self.root().join("setup/modules"), name, version, deps, files);
    }
}

fn append(builder: &mut Builder<GzEncoder<File>>, path: &str, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}

/// Write `<dir>/<name>-<version>.tar.gz`
pub fn write_package(
    dir: &Path,
    name: &str,
    version: &str,
    deps: &[&str],
    files: &[(&str, &str)],
) -> PathBuf {
    let mut manifest = format!(
        "[module]\nname = \"{}\"\nversion = \"{}\"\n",
        name, version
    );
    for dep in deps {
        manifest.push_str(&format!("\n[[dependencies]]\nname = \"{}\"\n", dep));
    }

    let path = dir.join(format!("{}-{}.tar.gz", name, version));
    let file = File::create(&path).unwrap();
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    append(&mut builder, "manifest.toml", manifest.as_bytes());
    for (file_path, content) in files {
        append(&mut builder, &format!("content/{}", file_path), content.as_bytes());
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}
