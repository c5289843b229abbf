// src/commands/properties.rs
//! Properties file commands

use anyhow::{Context, Result, anyhow};
use cms_setup::{PropertiesFile, SetupConfig};
use std::path::PathBuf;

fn properties_path(file: Option<&str>, config: &str) -> Result<PathBuf> {
    match file {
        Some(file) => Ok(PathBuf::from(file)),
        None => {
            let config = SetupConfig::load(config)
                .with_context(|| format!("No --file given and {} cannot be loaded", config))?;
            Ok(config.paths.properties)
        }
    }
}

/// Print the value of one key
pub fn cmd_properties_get(key: &str, file: Option<&str>, config: &str) -> Result<()> {
    let path = properties_path(file, config)?;
    let props = PropertiesFile::load(&path)?;
    let value = props
        .get(key)
        .ok_or_else(|| anyhow!("{} is not set in {}", key, path.display()))?;
    println!("{}", value);
    Ok(())
}

/// Set keys and save, preserving everything else
pub fn cmd_properties_set(
    assignments: &[String],
    file: Option<&str>,
    config: &str,
    dry_run: bool,
) -> Result<()> {
    let path = properties_path(file, config)?;
    let mut props = if path.exists() {
        PropertiesFile::load(&path)?
    } else {
        PropertiesFile::new()
    };

    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got '{}'", assignment))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("Empty key in '{}'", assignment));
        }
        props.set(key, value);
    }

    if dry_run {
        print!("{}", props.render());
        return Ok(());
    }

    props.save(&path)?;
    println!(
        "Updated {} key(s) in {}",
        props.tracked_keys().len(),
        path.display()
    );
    Ok(())
}

/// List every key with its value
pub fn cmd_properties_list(file: Option<&str>, config: &str) -> Result<()> {
    let path = properties_path(file, config)?;
    let props = PropertiesFile::load(&path)?;
    for key in props.keys() {
        println!("{}={}", key, props.get(key).unwrap_or_default());
    }
    Ok(())
}
