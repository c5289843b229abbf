// src/lib.rs

//! cms-setup: installation and upgrade tool for a content-management server
//!
//! Sets up a fresh server installation and updates an existing one:
//!
//! - Database scripts: per-product SQL scripts with `${token}` substitution,
//!   run statement by statement with accumulated errors
//! - Modules: packages ordered by their declared dependencies and imported
//!   into the content repository
//! - Components: operator-facing groups of modules selected by pattern
//! - Properties: the server's main properties file rewritten key by key,
//!   everything else preserved byte for byte
//! - Sites: the persisted site list
//!
//! Long operations run on a [`worker::Worker`] thread that streams
//! [`progress::ProgressEvent`]s and honours a [`progress::CancelToken`].

pub mod config;
pub mod db;
mod error;
pub mod modules;
pub mod progress;
pub mod properties;
pub mod setup;
pub mod sites;
pub mod template;
pub mod version;
pub mod worker;

pub use config::{DatabaseConfig, PathsConfig, SetupConfig, SetupOptions, DEFAULT_CONFIG_FILE};
pub use db::{ScriptError, ScriptErrorKind, ScriptKind, ScriptReport, SetupDb};
pub use error::{Error, Result};
pub use modules::{
    ComponentSet, ImportOutcome, ImportSequencer, InstalledModule, ModuleGraph, ModuleImporter,
    ModuleIndex, ModulePackage, Repository, SetupComponent,
};
pub use progress::{CancelToken, ProgressEvent, ReportLine, ReportLog, Reporter};
pub use properties::PropertiesFile;
pub use setup::{Setup, SetupContext, SetupOutcome, Update, UpdateOutcome, UpdatePlan};
pub use sites::{Site, SiteStore};
pub use version::ModuleVersion;
pub use worker::{Worker, WorkerState};
