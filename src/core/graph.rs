//! Dependency graph
//!
//! Directed "depends on" graph with cycle detection and topological ordering.
//! Two instances are kept per resolution: one for build order, one for init order.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A dependency cycle, listed from the first repeated node back to itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<String>);

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

/// Dependency graph
///
/// Nodes are visited in name order; each node keeps its dependencies in the
/// order they were added.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Adjacency list: node -> dependencies
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Ensure a node exists and append `deps` to its dependency list
    pub fn add_node_with_deps<S: AsRef<str>>(&mut self, name: &str, deps: &[S]) {
        self.add_node(name);
        for dep in deps {
            self.add_dep(name, dep.as_ref());
        }
    }

    /// Record that `parent` depends on `child`, creating either node if needed
    pub fn add_dep(&mut self, parent: &str, child: &str) {
        self.add_node(child);
        let deps = self.edges.entry(parent.to_string()).or_default();
        if !deps.iter().any(|d| d == child) {
            deps.push(child.to_string());
        }
    }

    /// All nodes, in name order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Dependencies of `name`, empty for unknown nodes
    pub fn deps(&self, name: &str) -> &[String] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether the node exists
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Compute a topological order of all nodes
    ///
    /// Dependencies precede their dependents, or follow them when `reverse` is set.
    /// A back edge aborts the walk and yields the offending cycle.
    pub fn topological(&self, reverse: bool) -> Result<Vec<String>, Cycle> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::with_capacity(self.edges.len());
        let mut path = Vec::new();

        for node in self.edges.keys() {
            if !visited.contains(node.as_str()) {
                self.visit(
                    node,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                    &mut path,
                )?;
            }
        }

        if reverse {
            result.reverse();
        }
        Ok(result)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        temp_visited: &mut HashSet<&'a str>,
        result: &mut Vec<String>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), Cycle> {
        if temp_visited.contains(node) {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
            cycle.push(node.to_string());
            return Err(Cycle(cycle));
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node);
        path.push(node);

        for dep in self.deps(node) {
            self.visit(dep, visited, temp_visited, result, path)?;
        }

        path.pop();
        temp_visited.remove(node);
        visited.insert(node);
        result.push(node.to_string());

        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.topological(false).is_err()
    }
}
