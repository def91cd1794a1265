//! Build dependency flow.
//!
//! Builds may name upstream builds that must succeed before they start. The
//! graph is fixed by the registry and validated once at startup.

use mediaci_core::registry::Registry;
use mediaci_core::stage::BuildResult;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Cycle detected through build: {0}")]
    Cycle(String),
    #[error("Build {builder} depends on unknown build {dependency}")]
    UnknownDependency { builder: String, dependency: String },
}

impl From<FlowError> for mediaci_core::Error {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Cycle(name) => mediaci_core::Error::DependencyCycle(name),
            FlowError::UnknownDependency {
                builder,
                dependency,
            } => mediaci_core::Error::UnknownBuilder {
                builder,
                dependency,
            },
        }
    }
}

/// Whether a selected build may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Some upstream build is still running or queued.
    Waiting,
    /// Some upstream build was not selected or did not succeed.
    Blocked,
}

/// Directed graph of build dependencies, edges pointing downstream.
#[derive(Debug)]
pub struct BuildFlow {
    graph: DiGraph<String, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl BuildFlow {
    /// Build the flow from the registry's `depends_on` declarations.
    pub fn from_registry(registry: &Registry) -> Result<Self, FlowError> {
        let edges = registry.builds().iter().map(|b| {
            (
                b.name.as_str(),
                b.depends_on.iter().map(String::as_str).collect::<Vec<_>>(),
            )
        });
        Self::from_edges(edges)
    }

    /// Build the flow from `(build, upstream builds)` pairs.
    pub fn from_edges<'a, I>(builds: I) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        let builds: Vec<_> = builds.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (name, _) in &builds {
            let idx = graph.add_node(name.to_string());
            name_to_index.insert(name.to_string(), idx);
        }

        for (name, upstream) in &builds {
            let idx = name_to_index[*name];
            for dep in upstream {
                let dep_idx = name_to_index.get(*dep).ok_or_else(|| {
                    FlowError::UnknownDependency {
                        builder: name.to_string(),
                        dependency: dep.to_string(),
                    }
                })?;
                graph.add_edge(*dep_idx, idx, ());
            }
        }

        let flow = Self {
            graph,
            name_to_index,
        };
        flow.topological_order()?;
        Ok(flow)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        self.name_to_index
            .get(name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .filter_map(|n| self.graph.node_weight(n))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Builds with no upstream dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(String::as_str)
            .collect()
    }

    pub fn upstream(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    pub fn downstream(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    pub fn topological_order(&self) -> Result<Vec<&str>, FlowError> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .map(String::as_str)
                    .collect()
            })
            .map_err(|cycle| {
                let name = self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default();
                FlowError::Cycle(name)
            })
    }

    /// Decide whether `name` may start given the builds selected for this
    /// event and the results of those already finished.
    pub fn readiness(
        &self,
        name: &str,
        selected: &HashSet<String>,
        finished: &HashMap<String, BuildResult>,
    ) -> Readiness {
        let mut waiting = false;
        for upstream in self.upstream(name) {
            if !selected.contains(upstream) {
                return Readiness::Blocked;
            }
            match finished.get(upstream) {
                Some(result) if result.is_success() => {}
                Some(_) => return Readiness::Blocked,
                None => waiting = true,
            }
        }
        if waiting {
            Readiness::Waiting
        } else {
            Readiness::Ready
        }
    }
}
