// src/modules/graph.rs

//! Module dependency graph for install ordering
//!
//! Modules must be imported after every module they depend on. This graph
//! records "depends on" edges and produces an install order with Kahn's
//! algorithm. Whenever several modules are ready at the same time the
//! alphabetically first one is taken, so the order does not depend on the
//! order in which modules were added.
//!
//! # Example
//!
//! ```ignore
//! use cms_setup::modules::ModuleGraph;
//!
//! let mut graph = ModuleGraph::new();
//! graph.add_module("c", &["a", "b"]);
//! graph.add_module("b", &["a"]);
//! graph.add_module("a", &[]);
//!
//! assert_eq!(graph.install_order().unwrap(), vec!["a", "b", "c"]);
//! ```
//!
//! A cycle cannot be installed in any order and is reported as
//! `Error::DependencyCycle`.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A directed graph of module dependencies
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    /// Key: module name, Value: modules it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Key: module name, Value: modules that depend on it
    reverse_edges: BTreeMap<String, BTreeSet<String>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module with its dependencies
    ///
    /// Adding the same module again merges the dependency lists. Every
    /// dependency becomes a node of the graph.
    pub fn add_module(&mut self, name: &str, dependencies: &[&str]) {
        self.edges.entry(name.to_string()).or_default();
        self.reverse_edges.entry(name.to_string()).or_default();

        for dep in dependencies {
            self.edges.entry(dep.to_string()).or_default();
            self.reverse_edges
                .entry(dep.to_string())
                .or_default()
                .insert(name.to_string());
            self.edges
                .entry(name.to_string())
                .or_default()
                .insert(dep.to_string());
        }
    }

    pub fn module_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Direct dependencies of a module
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// Modules that directly depend on this module
    pub fn dependents(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.reverse_edges.get(name)
    }

    /// Topological order: every module after all of its dependencies
    pub fn install_order(&self) -> Result<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());

            if let Some(dependents) = self.reverse_edges.get(node) {
                for dependent in dependents {
                    if let Some(deg) = remaining.get_mut(dependent.as_str()) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != self.edges.len() {
            let unordered: Vec<&str> = self
                .edges
                .keys()
                .map(String::as_str)
                .filter(|k| !order.iter().any(|o| o.as_str() == *k))
                .collect();

            let cycles: Vec<String> = self
                .find_cycles()
                .into_iter()
                .map(|mut cycle| {
                    if let Some(first) = cycle.first().cloned() {
                        cycle.push(first);
                    }
                    cycle.join(" -> ")
                })
                .collect();

            return Err(Error::DependencyCycle(format!(
                "cannot order {} (cycles: {})",
                unordered.join(", "),
                cycles.join("; ")
            )));
        }

        Ok(order)
    }

    /// Find the cycles reachable by depth-first search
    ///
    /// Each cycle is listed from the module where it was entered, following
    /// dependency edges.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut path = Vec::new();

        for start in self.edges.keys() {
            if !visited.contains(start.as_str()) {
                self.find_cycles_dfs(start, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn find_cycles_dfs<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        on_stack: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                let dep = dep.as_str();
                if !visited.contains(dep) {
                    self.find_cycles_dfs(dep, visited, on_stack, path, cycles);
                } else if on_stack.contains(dep) {
                    if let Some(start) = path.iter().position(|x| *x == dep) {
                        cycles.push(path[start..].iter().map(|s| s.to_string()).collect());
                    }
                }
            }
        }

        path.pop();
        on_stack.remove(node);
    }

    /// All modules a module transitively depends on
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        Self::walk(&self.edges, name)
    }

    /// All modules that transitively depend on a module
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        Self::walk(&self.reverse_edges, name)
    }

    fn walk(edges: &BTreeMap<String, BTreeSet<String>>, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some(direct) = edges.get(name) {
            queue.extend(direct.iter().map(String::as_str));
        }

        while let Some(next) = queue.pop_front() {
            if next != name && found.insert(next.to_string()) {
                if let Some(indirect) = edges.get(next) {
                    queue.extend(indirect.iter().map(String::as_str));
                }
            }
        }

        found
    }
}
