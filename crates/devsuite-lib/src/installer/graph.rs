//! Dependency graph over the live units of a run.
//!
//! Nodes are the non tool-only requirements that have a unit. An edge points from a dependency
//! to the unit that needs it, so a topological walk yields an install order.

use crate::catalog::{Catalog, DependencyRef};
use crate::error::GraphError;
use crate::installer::registry::UnitRegistry;
use petgraph::prelude::*;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Plain `requires` entry
    Depends,
    /// Member picked out of an OR-group
    AnyOf,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn build(units: &UnitRegistry, catalog: &Catalog) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        // Registry iteration is sorted by id, which keeps node indices stable across builds
        for unit in units.iter() {
            if unit.requirement().is_tool() {
                continue;
            }
            let index = graph.add_node(unit.id().to_string());
            nodes.insert(unit.id().to_string(), index);
        }

        for unit in units.iter() {
            let Some(&to) = nodes.get(unit.id()) else {
                continue;
            };
            for dependency in &unit.requirement().depends_on {
                let resolved = match dependency {
                    DependencyRef::One(id) => resolve_one(unit.id(), id, units, catalog)?
                        .map(|id| (id, EdgeKind::Depends)),
                    DependencyRef::AnyOf(group) => resolve_any_of(unit.id(), group, units)?
                        .map(|id| (id, EdgeKind::AnyOf)),
                };
                let Some((dep, kind)) = resolved else {
                    continue;
                };
                if let Some(&from) = nodes.get(dep) {
                    graph.update_edge(from, to, kind);
                }
            }
        }

        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(GraphError::Cycle(graph[cycle.node_id()].clone()));
        }

        let order = stable_order(&graph);
        log::debug!("Install order: {:?}", order);
        Ok(Self {
            graph,
            nodes,
            order,
        })
    }

    /// Every id after all of its resolved dependencies. Ties are broken by id.
    pub fn overall_order(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct dependants of `id`, sorted.
    pub fn dependants_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Outgoing)
    }

    /// Direct resolved dependencies of `id`, sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Incoming)
    }

    pub fn edge_kind(&self, from: &str, to: &str) -> Option<EdgeKind> {
        let edge = self.graph.find_edge(*self.nodes.get(from)?, *self.nodes.get(to)?)?;
        self.graph.edge_weight(edge).copied()
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&index) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids
    }
}

/// A single-id dependency must name a known unit. Tool-only targets produce no edge.
fn resolve_one<'a>(
    from: &str,
    id: &'a str,
    units: &UnitRegistry,
    catalog: &Catalog,
) -> Result<Option<&'a str>, GraphError> {
    if !units.contains(id) {
        return Err(GraphError::UnknownDependency {
            from: from.to_string(),
            to: id.to_string(),
        });
    }
    if catalog.is_tool(id) {
        return Ok(None);
    }
    Ok(Some(id))
}

/// First member, in declared order, that is either validly detected or selected for install.
/// Members missing from this run (e.g. not offered on this OS) are passed over.
fn resolve_any_of<'a>(
    from: &str,
    group: &'a [String],
    units: &UnitRegistry,
) -> Result<Option<&'a str>, GraphError> {
    let mut known = 0;
    for id in group {
        let Some(unit) = units.get(id) else {
            log::debug!("'{}': alternative '{}' is not part of this run", from, id);
            continue;
        };
        known += 1;
        if unit.has_valid_detection() || unit.will_install() {
            return Ok(Some(id.as_str()));
        }
    }

    if known == 0 {
        return Err(GraphError::UnsatisfiedAlternatives {
            from: from.to_string(),
            alternatives: group.to_vec(),
        });
    }
    log::warn!(
        "'{}': none of {:?} is detected or selected, no dependency edge added",
        from,
        group
    );
    Ok(None)
}

/// Kahn's algorithm, always taking the smallest ready id.
fn stable_order(graph: &DiGraph<String, EdgeKind>) -> Vec<String> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&n, _)| Reverse((graph[n].as_str(), n)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((id, node))) = ready.pop() {
        order.push(id.to_string());
        for next in graph.neighbors_directed(node, Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((graph[next].as_str(), next)));
                }
            }
        }
    }
    order
}
