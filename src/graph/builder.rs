//! Dependency graph construction and deterministic ordering.
//!
//! The builder scans declarations for reference tokens and explicit
//! `depends_on` entries, resolves them into edges, rejects unresolved
//! references and cycles, and computes a deterministic topological order
//! (Kahn's algorithm with a lexicographic tie-break).

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::ResourceDecl;
use crate::error::{ConfigError, GraphError, Result, StratusError};

/// A validated, topologically-sortable dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Edges: logical name -> names it depends on.
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Reverse edges: logical name -> names depending on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// Deterministic topological order (dependencies first).
    order: Vec<String>,
}

impl DependencyGraph {
    /// Builds the graph from a set of declarations.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceUnresolved` if a declaration references a logical
    /// name not present in the set, and `CyclicDependency` if the reference
    /// graph contains a cycle.
    pub fn build(decls: &BTreeMap<String, ResourceDecl>) -> Result<Self> {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (name, decl) in decls {
            let deps = decl.dependency_names().map_err(|message| {
                StratusError::Config(ConfigError::InvalidReference {
                    name: name.clone(),
                    message,
                })
            })?;

            let mut set = BTreeSet::new();
            for dep in deps {
                if !decls.contains_key(&dep) {
                    return Err(StratusError::Graph(GraphError::ReferenceUnresolved {
                        name: name.clone(),
                        target: dep,
                    }));
                }
                set.insert(dep);
            }
            edges.insert(name.clone(), set);
        }

        Self::from_edges(edges)
    }

    /// Builds a graph from pre-resolved edges.
    ///
    /// Used for teardown ordering, where edges come from `depends_on`
    /// recorded in state rather than from live declarations. Edge targets
    /// outside the node set are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the edges contain a cycle.
    pub fn from_edges(mut edges: BTreeMap<String, BTreeSet<String>>) -> Result<Self> {
        let nodes: BTreeSet<String> = edges.keys().cloned().collect();
        for deps in edges.values_mut() {
            deps.retain(|d| nodes.contains(d));
        }

        let mut dependents: BTreeMap<String, BTreeSet<String>> = nodes
            .iter()
            .map(|n| (n.clone(), BTreeSet::new()))
            .collect();
        for (name, deps) in &edges {
            for dep in deps {
                if let Some(set) = dependents.get_mut(dep) {
                    set.insert(name.clone());
                }
            }
        }

        let order = Self::topological_order(&edges, &dependents)?;
        debug!("Dependency order: {}", order.join(", "));

        Ok(Self {
            dependencies: edges,
            dependents,
            order,
        })
    }

    /// Kahn's algorithm with a `BTreeSet` ready set, so ties break
    /// lexicographically and plans are reproducible across runs.
    fn topological_order(
        dependencies: &BTreeMap<String, BTreeSet<String>>,
        dependents: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(dependencies.len());

        while let Some(name) = ready.iter().next().copied() {
            ready.remove(name);
            order.push(name.to_string());

            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        if order.len() < dependencies.len() {
            let cycle = Self::find_cycle(dependencies);
            return Err(StratusError::Graph(GraphError::CyclicDependency { cycle }));
        }

        Ok(order)
    }

    /// Extracts one concrete cycle path for the error message, via
    /// depth-first traversal tracking an in-progress set.
    fn find_cycle(dependencies: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            dependencies: &'a BTreeMap<String, BTreeSet<String>>,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::InProgress);
            stack.push(node);

            if let Some(deps) = dependencies.get(node) {
                for dep in deps {
                    match marks.get(dep.as_str()) {
                        Some(Mark::InProgress) => {
                            let start = stack.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|s| (*s).to_string()).collect();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(Mark::Done) => {}
                        None => {
                            if let Some(cycle) = visit(dep, dependencies, marks, stack) {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        for node in dependencies.keys() {
            if !marks.contains_key(node.as_str()) {
                if let Some(cycle) = visit(node, dependencies, &mut marks, &mut stack) {
                    return cycle;
                }
            }
        }
        Vec::new()
    }

    /// Returns the deterministic topological order, dependencies first.
    #[must_use]
    pub fn topo_order(&self) -> &[String] {
        &self.order
    }

    /// Returns the direct dependencies of a node.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the direct dependents of a node.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.dependents
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns true if the graph contains the node.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
