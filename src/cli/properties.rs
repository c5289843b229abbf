// src/cli/properties.rs
//! Properties file commands

use super::DEFAULT_CONFIG;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum PropertiesCommands {
    /// Print the value of a key
    Get {
        /// Property key
        key: String,

        /// Properties file (default: the file named by the setup configuration)
        #[arg(short, long)]
        file: Option<String>,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Set one or more keys, leaving the rest of the file untouched
    Set {
        /// Assignments in the form key=value
        #[arg(required = true)]
        assignments: Vec<String>,

        /// Properties file (default: the file named by the setup configuration)
        #[arg(short, long)]
        file: Option<String>,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Print the rewritten file instead of saving it
        #[arg(long)]
        dry_run: bool,
    },

    /// List all keys
    List {
        /// Properties file (default: the file named by the setup configuration)
        #[arg(short, long)]
        file: Option<String>,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}
