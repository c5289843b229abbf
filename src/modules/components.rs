// src/modules/components.rs

//! Setup components: named groups of modules the operator can select
//!
//! Components are defined in a properties file:
//!
//! ```text
//! components=base,workplace,demo
//!
//! component.base.name=Base system
//! component.base.description=Core modules every installation needs
//! component.base.modules=org\.example\.(core|base).*
//! component.base.position=10
//! component.base.checked=true
//!
//! component.demo.name=Demo content
//! component.demo.modules=org\.example\.demo.*
//! component.demo.dependencies=base,workplace
//! component.demo.position=30
//! ```
//!
//! A module belongs to a component when its whole name matches the
//! component's pattern. Selecting a component also selects every component
//! it depends on.

use super::ModuleIndex;
use crate::error::{Error, Result};
use crate::properties::PropertiesFile;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// A selectable group of modules
#[derive(Debug, Clone)]
pub struct SetupComponent {
    pub id: String,
    pub name: String,
    pub description: String,
    modules: Regex,
    pub dependencies: Vec<String>,
    pub position: i32,
    /// Selected unless the operator deselects it
    pub checked: bool,
}

impl SetupComponent {
    /// Create a component from its module pattern
    pub fn new(id: impl Into<String>, name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            modules: compile_pattern(pattern)?,
            dependencies: Vec::new(),
            position: 0,
            checked: false,
        })
    }

    /// Whether `module` belongs to this component
    pub fn matches(&self, module: &str) -> bool {
        self.modules.is_match(module)
    }

    /// The module pattern as written in the definition
    pub fn pattern(&self) -> &str {
        let anchored = self.modules.as_str();
        anchored
            .strip_prefix("^(?:")
            .and_then(|s| s.strip_suffix(")$"))
            .unwrap_or(anchored)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// All components of an installation, sorted by position
#[derive(Debug, Clone, Default)]
pub struct ComponentSet {
    components: Vec<SetupComponent>,
}

impl ComponentSet {
    pub fn new(mut components: Vec<SetupComponent>) -> Self {
        components.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Self { components }
    }

    /// Load component definitions from a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let props = PropertiesFile::load(path)?;
        Self::from_properties(&props)
    }

    /// Build components from parsed properties
    pub fn from_properties(props: &PropertiesFile) -> Result<Self> {
        let ids = props
            .get("components")
            .map(split_list)
            .ok_or_else(|| Error::Config("Component definitions lack a 'components' key".to_string()))?;

        let mut components = Vec::with_capacity(ids.len());
        for id in ids {
            let key = |field: &str| format!("component.{}.{}", id, field);

            // Patterns are regular expressions; their backslashes are kept
            let pattern = props.get_raw(&key("modules")).ok_or_else(|| {
                Error::Config(format!("Component '{}' has no modules pattern", id))
            })?;
            let name = props.get(&key("name")).unwrap_or(&id).to_string();

            let mut component = SetupComponent::new(id.clone(), name, pattern)?;
            component.description = props.get(&key("description")).unwrap_or_default().to_string();
            component.dependencies = props.get(&key("dependencies")).map(split_list).unwrap_or_default();
            component.checked = props
                .get(&key("checked"))
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            component.position = match props.get(&key("position")) {
                Some(raw) => raw.trim().parse().map_err(|e| {
                    Error::Config(format!("Component '{}' has invalid position '{}': {}", id, raw, e))
                })?,
                None => 0,
            };
            components.push(component);
        }

        let set = Self::new(components);
        set.validate()?;
        debug!("Loaded {} setup component(s)", set.components.len());
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        for component in &self.components {
            for dep in &component.dependencies {
                if self.get(dep).is_none() {
                    return Err(Error::Config(format!(
                        "Component '{}' depends on unknown component '{}'",
                        component.id, dep
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&SetupComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Components in display order
    pub fn iter(&self) -> impl Iterator<Item = &SetupComponent> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Ids of the components checked by default
    pub fn default_selection(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| c.checked)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Expand a selection with every component it depends on
    ///
    /// Returns the components in display order.
    pub fn resolve_selection(&self, ids: &[String]) -> Result<Vec<&SetupComponent>> {
        let mut selected: BTreeSet<&str> = BTreeSet::new();
        let mut pending: Vec<&str> = Vec::new();

        for id in ids {
            let component = self
                .get(id)
                .ok_or_else(|| Error::Config(format!("Unknown component '{}'", id)))?;
            pending.push(component.id.as_str());
        }

        while let Some(id) = pending.pop() {
            if !selected.insert(id) {
                continue;
            }
            if let Some(component) = self.get(id) {
                for dep in &component.dependencies {
                    if !ids.iter().any(|i| i == dep) && !selected.contains(dep.as_str()) {
                        debug!("Component '{}' pulls in '{}'", id, dep);
                    }
                    pending.push(dep.as_str());
                }
            }
        }

        Ok(self
            .components
            .iter()
            .filter(|c| selected.contains(c.id.as_str()))
            .collect())
    }

    /// Names of the modules in `index` that belong to the selected components
    ///
    /// Names are returned alphabetically; modules matched by no selected
    /// component are left out.
    pub fn modules_for(&self, ids: &[String], index: &ModuleIndex) -> Result<Vec<String>> {
        let selection = self.resolve_selection(ids)?;

        for component in &selection {
            if !index.names().any(|m| component.matches(m)) {
                warn!(
                    "Component '{}' matches no module in the module folder",
                    component.id
                );
            }
        }

        Ok(index
            .names()
            .filter(|m| selection.iter().any(|c| c.matches(m)))
            .map(str::to_string)
            .collect())
    }

    /// Components whose pattern matches a module
    pub fn owners_of(&self, module: &str) -> Vec<&SetupComponent> {
        self.components.iter().filter(|c| c.matches(module)).collect()
    }
}
