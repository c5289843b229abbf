// src/cli/mod.rs
//! CLI definitions for cms-setup
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Installation:
//! - `setup` - Prepare the database and import the selected modules
//! - `update` - Import newer module versions into an existing installation
//!
//! Inspection:
//! - `order` - Show the install order of the selected modules
//! - `components` - List the setup components
//! - `deps` - Show what a module needs or what needs it
//!
//! Administration:
//! - `script` - Run one database script
//! - `properties` - Read or change the server properties file
//! - `sites` - Manage the site list

use clap::{Parser, Subcommand};

mod properties;
mod sites;

pub use properties::PropertiesCommands;
pub use sites::SitesCommands;

/// Default location of the setup configuration
pub const DEFAULT_CONFIG: &str = cms_setup::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "cms-setup")]
#[command(author = "cms-setup Contributors")]
#[command(version)]
#[command(about = "Installation and upgrade tool for a content-management server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up a new installation
    ///
    /// Runs the configured database scripts, writes the connection settings
    /// into the properties file and imports the modules of the selected
    /// components in dependency order.
    Setup {
        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Component to install (repeatable; default: configured or checked components)
        #[arg(long = "component")]
        components: Vec<String>,

        /// Drop an existing database first
        #[arg(long)]
        drop_database: bool,

        /// Stop each script at its first failing statement
        #[arg(long)]
        abort_on_error: bool,

        /// Show the install order without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Update an existing installation
    Update {
        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Component whose new modules should be installed (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,

        /// Run the update_tables script before importing
        #[arg(long)]
        update_tables: bool,

        /// Show which modules would be imported without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the install order of modules
    Order {
        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Component to order (repeatable; default: configured or checked components)
        #[arg(long = "component")]
        components: Vec<String>,

        /// Order every module in the module folder
        #[arg(short, long)]
        all: bool,
    },

    /// List setup components and their modules
    Components {
        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Also list the modules of each component
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the modules a module depends on, directly or transitively
    Deps {
        /// Module name
        module: String,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// List the modules that depend on it instead
        #[arg(short, long)]
        reverse: bool,
    },

    /// Run one database script
    Script {
        /// Script to run: create_db, drop_db, create_tables, drop_tables, update_tables
        kind: String,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Run this file instead of the product script
        #[arg(short, long)]
        file: Option<String>,

        /// Stop at the first failing statement
        #[arg(long)]
        abort_on_error: bool,
    },

    /// Read or change the server properties file
    Properties {
        #[command(subcommand)]
        command: PropertiesCommands,
    },

    /// Manage the site list
    Sites {
        #[command(subcommand)]
        command: SitesCommands,
    },
}
