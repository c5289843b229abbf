// src/sites/mod.rs

//! Site definitions and the site store
//!
//! A site maps a server URL to a folder of the content repository. The
//! store keeps the site list in a TOML file:
//!
//! ```toml
//! [[site]]
//! server_url = "http://www.example.org"
//! site_root = "/sites/default"
//! title = "Default site"
//! secure_url = "https://www.example.org"
//! aliases = ["http://example.org"]
//! webserver = true
//! ```
//!
//! Sites are edited in memory with [`SiteStore::commit`] and
//! [`SiteStore::remove`], then written back with [`SiteStore::save`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// One site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub server_url: String,
    pub site_root: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_url: Option<String>,
    /// Further server URLs answering for this site
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Include the site in the web server configuration
    #[serde(default)]
    pub webserver: bool,
}

fn check_url(site_root: &str, field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let parsed = Url::parse(value).map_err(|e| {
        Error::InvalidSite(format!("{}: {} '{}' is not a URL: {}", site_root, field, value, e))
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(Error::InvalidSite(format!(
            "{}: {} '{}' must use {}",
            site_root,
            field,
            value,
            schemes.join(" or ")
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidSite(format!(
            "{}: {} '{}' has no host",
            site_root, field, value
        )));
    }
    Ok(())
}

/// Compare server URLs ignoring case and a trailing slash
fn same_server(a: &str, b: &str) -> bool {
    a.trim_end_matches('/')
        .eq_ignore_ascii_case(b.trim_end_matches('/'))
}

impl Site {
    pub fn new(server_url: impl Into<String>, site_root: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            site_root: site_root.into(),
            title: String::new(),
            secure_url: None,
            aliases: Vec::new(),
            webserver: false,
        }
    }

    /// Site root without trailing slashes
    pub fn normalized_root(&self) -> String {
        normalize_root(&self.site_root)
    }

    /// Check the site on its own
    ///
    /// The site root must be an absolute repository path other than `/`;
    /// server URL and aliases must be http or https URLs with a host; the
    /// secure URL must use https.
    pub fn validate(&self) -> Result<()> {
        let root = self.normalized_root();
        if !root.starts_with('/') || root == "/" || root.is_empty() {
            return Err(Error::InvalidSite(format!(
                "Site root '{}' must be an absolute folder below /",
                self.site_root
            )));
        }
        if root.split('/').any(|c| c == "..") {
            return Err(Error::InvalidSite(format!(
                "Site root '{}' must not contain '..'",
                self.site_root
            )));
        }

        check_url(&root, "server URL", &self.server_url, &["http", "https"])?;
        if let Some(secure) = &self.secure_url {
            check_url(&root, "secure URL", secure, &["https"])?;
        }
        for alias in &self.aliases {
            check_url(&root, "alias", alias, &["http", "https"])?;
        }
        Ok(())
    }

    /// Every URL this site answers to, secure URL included
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.server_url.as_str())
            .chain(self.secure_url.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
    }
}

fn normalize_root(root: &str) -> String {
    let trimmed = root.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SiteFile {
    #[serde(default, rename = "site")]
    sites: Vec<Site>,
}

/// The persisted site list
#[derive(Debug, Clone)]
pub struct SiteStore {
    path: PathBuf,
    sites: Vec<Site>,
}

impl SiteStore {
    /// Load the store; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sites = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: SiteFile = toml::from_str(&content)?;
            file.sites
        } else {
            debug!("Site store {} does not exist yet", path.display());
            Vec::new()
        };

        let mut store = Self {
            path,
            sites: Vec::new(),
        };
        for site in sites {
            store.commit(site)?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sites ordered by site root
    pub fn list(&self) -> &[Site] {
        &self.sites
    }

    pub fn get(&self, site_root: &str) -> Option<&Site> {
        let root = normalize_root(site_root);
        self.sites.iter().find(|s| s.site_root == root)
    }

    /// Insert a site or replace the site with the same root
    ///
    /// Fails when the site is invalid or one of its URLs already belongs to
    /// another site.
    pub fn commit(&mut self, mut site: Site) -> Result<()> {
        site.validate()?;
        site.site_root = site.normalized_root();

        for other in self.sites.iter().filter(|s| s.site_root != site.site_root) {
            if let Some(url) = site
                .urls()
                .find(|url| other.urls().any(|o| same_server(o, url)))
            {
                return Err(Error::InvalidSite(format!(
                    "{} is already used by site {}",
                    url, other.site_root
                )));
            }
        }

        match self.sites.iter_mut().find(|s| s.site_root == site.site_root) {
            Some(existing) => {
                debug!("Replacing site {}", site.site_root);
                *existing = site;
            }
            None => {
                debug!("Adding site {}", site.site_root);
                self.sites.push(site);
                self.sites.sort_by(|a, b| a.site_root.cmp(&b.site_root));
            }
        }
        Ok(())
    }

    /// Remove a site by root and return it
    pub fn remove(&mut self, site_root: &str) -> Result<Site> {
        let root = normalize_root(site_root);
        let idx = self
            .sites
            .iter()
            .position(|s| s.site_root == root)
            .ok_or_else(|| Error::SiteNotFound(site_root.to_string()))?;
        Ok(self.sites.remove(idx))
    }

    /// Find the site serving `server_url`
    pub fn match_server(&self, server_url: &str) -> Option<&Site> {
        self.sites
            .iter()
            .find(|s| s.urls().any(|u| same_server(u, server_url)))
    }

    /// Write the store back to its file, replacing it atomically
    pub fn save(&self) -> Result<()> {
        let file = SiteFile {
            sites: self.sites.clone(),
        };
        let content = toml::to_string_pretty(&file)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        info!("Saved {} site(s) to {}", self.sites.len(), self.path.display());
        Ok(())
    }
}
