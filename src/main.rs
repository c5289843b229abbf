// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, PropertiesCommands, SitesCommands};
use cms_setup::Site;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Setup {
            config,
            components,
            drop_database,
            abort_on_error,
            dry_run,
        }) => commands::cmd_setup(&config, components, drop_database, abort_on_error, dry_run),

        Some(Commands::Update {
            config,
            components,
            update_tables,
            dry_run,
        }) => commands::cmd_update(&config, components, update_tables, dry_run),

        Some(Commands::Order {
            config,
            components,
            all,
        }) => commands::cmd_order(&config, components, all),

        Some(Commands::Components { config, verbose }) => {
            commands::cmd_components(&config, verbose)
        }

        Some(Commands::Deps {
            module,
            config,
            reverse,
        }) => commands::cmd_deps(&module, &config, reverse),

        Some(Commands::Script {
            kind,
            config,
            file,
            abort_on_error,
        }) => commands::cmd_script(&kind, &config, file.as_deref(), abort_on_error),

        Some(Commands::Properties { command }) => match command {
            PropertiesCommands::Get { key, file, config } => {
                commands::cmd_properties_get(&key, file.as_deref(), &config)
            }
            PropertiesCommands::Set {
                assignments,
                file,
                config,
                dry_run,
            } => commands::cmd_properties_set(&assignments, file.as_deref(), &config, dry_run),
            PropertiesCommands::List { file, config } => {
                commands::cmd_properties_list(file.as_deref(), &config)
            }
        },

        Some(Commands::Sites { command }) => match command {
            SitesCommands::List { config, json } => commands::cmd_sites_list(&config, json),
            SitesCommands::Show { site_root, config } => {
                commands::cmd_sites_show(&site_root, &config)
            }
            SitesCommands::Add {
                server_url,
                site_root,
                title,
                secure_url,
                aliases,
                webserver,
                config,
            } => {
                let site = Site {
                    server_url,
                    site_root,
                    title,
                    secure_url,
                    aliases,
                    webserver,
                };
                commands::cmd_sites_add(site, &config)
            }
            SitesCommands::Remove { site_root, config } => {
                commands::cmd_sites_remove(&site_root, &config)
            }
        },

        None => {
            // No command provided, show help
            println!("cms-setup v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'cms-setup --help' for usage information");
            Ok(())
        }
    }
}
