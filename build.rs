// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: setup configuration path
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("setup.toml")
        .help("Path to the setup configuration")
}

/// Common argument: component selection
fn component_arg() -> Arg {
    Arg::new("component")
        .long("component")
        .action(ArgAction::Append)
        .help("Component to install (repeatable)")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn file_arg() -> Arg {
    Arg::new("file")
        .short('f')
        .long("file")
        .help("Properties file (default: the file named by the setup configuration)")
}

fn build_cli() -> Command {
    Command::new("cms-setup")
        .version(env!("CARGO_PKG_VERSION"))
        .author("cms-setup Contributors")
        .about("Installation and upgrade tool for a content-management server")
        .subcommand_required(false)
        .subcommand(
            Command::new("setup")
                .about("Set up a new installation")
                .arg(config_arg())
                .arg(component_arg())
                .arg(flag("drop-database", "Drop an existing database first"))
                .arg(flag("abort-on-error", "Stop each script at its first failing statement"))
                .arg(flag("dry-run", "Show the install order without changing anything")),
        )
        .subcommand(
            Command::new("update")
                .about("Update an existing installation")
                .arg(config_arg())
                .arg(component_arg())
                .arg(flag("update-tables", "Run the update_tables script before importing"))
                .arg(flag("dry-run", "Show which modules would be imported")),
        )
        .subcommand(
            Command::new("order")
                .about("Show the install order of modules")
                .arg(config_arg())
                .arg(component_arg())
                .arg(flag("all", "Order every module in the module folder")),
        )
        .subcommand(
            Command::new("components")
                .about("List setup components and their modules")
                .arg(config_arg())
                .arg(flag("verbose", "Also list the modules of each component")),
        )
        .subcommand(
            Command::new("deps")
                .about("Show the modules a module depends on, directly or transitively")
                .arg(Arg::new("module").required(true).help("Module name"))
                .arg(config_arg())
                .arg(
                    Arg::new("reverse")
                        .short('r')
                        .long("reverse")
                        .action(ArgAction::SetTrue)
                        .help("List the modules that depend on it instead"),
                ),
        )
        .subcommand(
            Command::new("script")
                .about("Run one database script")
                .arg(
                    Arg::new("kind")
                        .required(true)
                        .help("create_db, drop_db, create_tables, drop_tables or update_tables"),
                )
                .arg(config_arg())
                .arg(Arg::new("file").short('f').long("file").help("Run this file instead"))
                .arg(flag("abort-on-error", "Stop at the first failing statement")),
        )
        .subcommand(
            Command::new("properties")
                .about("Read or change the server properties file")
                .subcommand(
                    Command::new("get")
                        .about("Print the value of a key")
                        .arg(Arg::new("key").required(true))
                        .arg(file_arg())
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new("set")
                        .about("Set keys, leaving the rest of the file untouched")
                        .arg(
                            Arg::new("assignments")
                                .required(true)
                                .action(ArgAction::Append)
                                .help("key=value"),
                        )
                        .arg(file_arg())
                        .arg(config_arg())
                        .arg(flag("dry-run", "Print the rewritten file instead of saving it")),
                )
                .subcommand(
                    Command::new("list")
                        .about("List all keys")
                        .arg(file_arg())
                        .arg(config_arg()),
                ),
        )
        .subcommand(
            Command::new("sites")
                .about("Manage the site list")
                .subcommand(
                    Command::new("list")
                        .about("List all sites")
                        .arg(config_arg())
                        .arg(flag("json", "Output as JSON")),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show one site")
                        .arg(Arg::new("site_root").required(true))
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new("add")
                        .about("Add a site or replace the site with the same root")
                        .arg(Arg::new("server_url").required(true))
                        .arg(Arg::new("site_root").required(true))
                        .arg(Arg::new("title").short('t').long("title"))
                        .arg(Arg::new("secure_url").long("secure-url"))
                        .arg(Arg::new("alias").long("alias").action(ArgAction::Append))
                        .arg(flag("webserver", "Include the site in the web server configuration"))
                        .arg(config_arg()),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a site")
                        .arg(Arg::new("site_root").required(true))
                        .arg(config_arg()),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("cms-setup.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
