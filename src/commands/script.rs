// src/commands/script.rs
//! Database script command

use anyhow::{Context, Result, bail};
use cms_setup::{CancelToken, ScriptKind, SetupConfig, SetupDb};
use std::path::Path;

/// Run one product script, or an arbitrary file, against the configured database
pub fn cmd_script(kind: &str, config: &str, file: Option<&str>, abort_on_error: bool) -> Result<()> {
    let config = SetupConfig::load(config)
        .with_context(|| format!("Failed to load setup configuration {}", config))?;
    let db = SetupDb::from_config(&config).with_abort_on_error(abort_on_error || config.setup.abort_on_error);
    let cancel = CancelToken::new();

    let report = match (file, ScriptKind::parse(kind)) {
        (Some(file), _) => db.run_file(Path::new(file), kind, &cancel),
        (None, Some(ScriptKind::CreateDatabase)) => db.create_database(&cancel),
        (None, Some(ScriptKind::DropDatabase)) => db.drop_database(&cancel),
        (None, Some(kind)) => db.run(kind, &cancel),
        (None, None) => bail!(
            "Unknown script '{}' (expected create_db, drop_db, create_tables, drop_tables or update_tables)",
            kind
        ),
    };

    println!(
        "{}: {} of {} statement(s) executed",
        report.script, report.executed, report.statements
    );
    for error in &report.errors {
        println!("  error: {}", error);
    }
    if report.aborted {
        println!("  script aborted");
    }

    report.into_result()?;
    Ok(())
}
