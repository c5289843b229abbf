// src/commands/sites.rs
//! Site administration commands

use anyhow::{Context, Result, anyhow};
use cms_setup::{SetupConfig, Site, SiteStore};

fn open_store(config: &str) -> Result<SiteStore> {
    let config = SetupConfig::load(config)
        .with_context(|| format!("Failed to load setup configuration {}", config))?;
    Ok(SiteStore::load(config.paths.sites)?)
}

fn print_site(site: &Site) {
    println!("{}", site.site_root);
    if !site.title.is_empty() {
        println!("  Title: {}", site.title);
    }
    println!("  Server: {}", site.server_url);
    if let Some(secure) = &site.secure_url {
        println!("  Secure server: {}", secure);
    }
    for alias in &site.aliases {
        println!("  Alias: {}", alias);
    }
    println!("  Web server: {}", if site.webserver { "yes" } else { "no" });
}

/// List all sites
pub fn cmd_sites_list(config: &str, json: bool) -> Result<()> {
    let store = open_store(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(store.list())?);
        return Ok(());
    }

    if store.list().is_empty() {
        println!("No sites defined in {}", store.path().display());
        return Ok(());
    }
    for site in store.list() {
        println!("{:<30} {}  {}", site.site_root, site.server_url, site.title);
    }
    Ok(())
}

/// Show one site
pub fn cmd_sites_show(site_root: &str, config: &str) -> Result<()> {
    let store = open_store(config)?;
    let site = store
        .get(site_root)
        .ok_or_else(|| anyhow!("Site not found: {}", site_root))?;
    print_site(site);
    Ok(())
}

/// Add or replace a site
pub fn cmd_sites_add(site: Site, config: &str) -> Result<()> {
    let mut store = open_store(config)?;
    let replacing = store.get(&site.site_root).is_some();
    let root = site.normalized_root();

    store.commit(site)?;
    store.save()?;

    if replacing {
        println!("Updated site {}", root);
    } else {
        println!("Added site {}", root);
    }
    Ok(())
}

/// Remove a site
pub fn cmd_sites_remove(site_root: &str, config: &str) -> Result<()> {
    let mut store = open_store(config)?;
    let removed = store.remove(site_root)?;
    store.save()?;
    println!("Removed site {} ({})", removed.site_root, removed.server_url);
    Ok(())
}
