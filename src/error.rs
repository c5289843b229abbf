// src/error.rs

//! Error types for cms-setup

use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during setup, update and site administration
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with context
    #[error("IO error: {0}")]
    IoError(String),

    /// Malformed input (manifest, properties, version string)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid or incomplete setup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced file does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Module dependency graph contains a cycle
    #[error("Circular module dependency detected: {0}")]
    DependencyCycle(String),

    /// A module named by a component or dependency is not in the module folder
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Module import into the repository failed
    #[error("Failed to import module {module}: {reason}")]
    ImportFailed { module: String, reason: String },

    /// Archive entry tried to escape the repository root
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Site definition failed validation
    #[error("Invalid site: {0}")]
    InvalidSite(String),

    /// Site with the given root path does not exist
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// A database script could not run to completion
    #[error("Script {script} failed: {errors} error(s)")]
    ScriptFailed { script: String, errors: usize },

    /// Operation was cancelled through its cancel token
    #[error("Operation cancelled")]
    Cancelled,

    /// Worker thread terminated abnormally
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::IoError(format!("TOML serialization failed: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(format!("Invalid pattern: {}", err))
    }
}
