// src/commands/setup.rs
//! Setup, update and module inspection commands

use super::progress::WorkerProgress;
use anyhow::{Context, Result};
use cms_setup::{Setup, SetupContext, Update};
use tracing::info;

fn load_context(config: &str) -> Result<SetupContext> {
    SetupContext::load(config).with_context(|| format!("Failed to load setup from {}", config))
}

/// Set up a new installation
pub fn cmd_setup(
    config: &str,
    components: Vec<String>,
    drop_database: bool,
    abort_on_error: bool,
    dry_run: bool,
) -> Result<()> {
    let mut context = load_context(config)?;
    if drop_database {
        context.config.setup.drop_database = true;
    }
    if abort_on_error {
        context.config.setup.abort_on_error = true;
    }

    let mut setup = Setup::new(context);
    if !components.is_empty() {
        setup.select(components)?;
    }

    let order = setup.install_order()?;
    if dry_run {
        println!(
            "Would install {} module(s) for component(s) {}:",
            order.len(),
            setup.selection().join(", ")
        );
        for (i, name) in order.iter().enumerate() {
            println!("  {:>3}. {}", i + 1, name);
        }
        return Ok(());
    }

    info!("Starting setup with {} module(s)", order.len());
    let progress = WorkerProgress::new("Importing modules");
    let mut worker = setup.spawn()?;
    let outcome = progress.follow(&mut worker)?;

    println!(
        "Setup complete: {} module(s), {} file(s) imported",
        outcome.imported.module_count(),
        outcome.imported.file_count()
    );
    if outcome.warning_count() > 0 {
        println!("  {} script warning(s)", outcome.warning_count());
    }
    Ok(())
}

/// Update an existing installation
pub fn cmd_update(
    config: &str,
    components: Vec<String>,
    update_tables: bool,
    dry_run: bool,
) -> Result<()> {
    let mut context = load_context(config)?;
    if update_tables {
        context.config.setup.update_tables = true;
    }

    let mut update = Update::new(context);
    if !components.is_empty() {
        update.select(components)?;
    }

    if dry_run {
        let repository = cms_setup::Repository::from_config(&update.context().config)?;
        let plan = update.plan(&repository)?;
        if plan.is_empty() {
            println!("All modules are up to date");
            return Ok(());
        }
        println!("Would import {} module(s):", plan.changes.len());
        for change in &plan.changes {
            match &change.installed {
                Some(old) => println!("  {} {} -> {}", change.name, old, change.available),
                None => println!("  {} (new) {}", change.name, change.available),
            }
        }
        return Ok(());
    }

    let progress = WorkerProgress::new("Updating modules");
    let mut worker = update.spawn()?;
    let outcome = progress.follow(&mut worker)?;

    println!(
        "Update complete: {} module(s) imported",
        outcome.imported.module_count()
    );
    Ok(())
}

/// Show the install order
pub fn cmd_order(config: &str, components: Vec<String>, all: bool) -> Result<()> {
    let context = load_context(config)?;

    let order = if all {
        let names: Vec<String> = context.modules.names().map(str::to_string).collect();
        context.modules.install_order(&names)?
    } else {
        let mut setup = Setup::new(context);
        if !components.is_empty() {
            setup.select(components)?;
        }
        setup.install_order()?
    };

    for name in &order {
        println!("{}", name);
    }
    Ok(())
}

/// List components
pub fn cmd_components(config: &str, verbose: bool) -> Result<()> {
    let context = load_context(config)?;
    if context.components.is_empty() {
        println!("No components defined");
        return Ok(());
    }

    for component in context.components.iter() {
        let mark = if component.checked { "[x]" } else { "[ ]" };
        println!("{} {} - {}", mark, component.id, component.name);
        if !component.description.is_empty() {
            println!("      {}", component.description);
        }
        if !component.dependencies.is_empty() {
            println!("      requires: {}", component.dependencies.join(", "));
        }
        if verbose {
            let modules: Vec<&str> = context
                .modules
                .names()
                .filter(|m| component.matches(m))
                .collect();
            println!("      pattern: {}", component.pattern());
            for module in modules {
                println!("        {}", module);
            }
        }
    }
    Ok(())
}

/// Show dependencies or dependents of a module
pub fn cmd_deps(module: &str, config: &str, reverse: bool) -> Result<()> {
    let context = load_context(config)?;
    let related = context.modules.related(module, reverse)?;

    if related.is_empty() {
        if reverse {
            println!("No module depends on {}", module);
        } else {
            println!("{} has no dependencies in the module folder", module);
        }
        return Ok(());
    }

    let label = if reverse { "Needed by" } else { "Needs" };
    println!("{} ({} module(s)):", label, related.len());
    for name in &related {
        println!("  {}", name);
    }
    Ok(())
}
