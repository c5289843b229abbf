// src/cli/sites.rs
//! Site administration commands

use super::DEFAULT_CONFIG;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum SitesCommands {
    /// List all sites
    List {
        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one site
    Show {
        /// Site root, e.g. /sites/default
        site_root: String,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Add a site or replace the site with the same root
    Add {
        /// Server URL, e.g. http://www.example.org
        server_url: String,

        /// Site root, e.g. /sites/default
        site_root: String,

        /// Site title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Secure (https) URL
        #[arg(long)]
        secure_url: Option<String>,

        /// Additional server URL (repeatable)
        #[arg(long = "alias")]
        aliases: Vec<String>,

        /// Include the site in the web server configuration
        #[arg(long)]
        webserver: bool,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Remove a site
    Remove {
        /// Site root of the site to remove
        site_root: String,

        /// Path to the setup configuration
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}
