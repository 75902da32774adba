//! The control-flow automaton.
//!
//! A [`Cfa`] is a directed multigraph whose nodes are program locations and
//! whose edges carry an [`EdgeKind`]. It is built once (see
//! [`CfaBuilder`](crate::CfaBuilder)), validated, and then only read: the
//! analysis shares it behind an `Arc`.
//!
//! Derived facts such as loop heads, function entries and call-return sites
//! are recomputed at construction time and stored as [`LocationFlags`].
use std::{collections::BTreeSet, fmt};

use bitflags::bitflags;
use log::debug;
use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    prelude::DiGraphMap,
    visit::{DfsEvent, EdgeRef, depth_first_search},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    edge::{CfaEdge, EdgeId, EdgeKind, FunctionId},
    error::{CfaError, CfaResult},
    expr::Var,
};

/// Opaque handle to a CFA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location(pub(crate) NodeIndex);

impl Location {
    pub fn index(self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0.index())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct LocationFlags: u8 {
        /// Target of a back edge of an intraprocedural depth-first search.
        const LOOP_HEAD = 1 << 0;
        const FUNCTION_ENTRY = 1 << 1;
        /// Location reached by a return edge.
        const CALL_RETURN_SITE = 1 << 2;
        const FUNCTION_EXIT = 1 << 3;
        /// Reaching this location violates the property.
        const TARGET = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationInfo {
    pub function: FunctionId,
    pub flags: LocationFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<Var>,
    /// Variable receiving the returned value, read by return edges.
    pub return_var: Var,
    pub entry: Location,
    pub exit: Location,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cfa {
    graph: DiGraph<LocationInfo, EdgeKind>,
    functions: Vec<FunctionInfo>,
    main: FunctionId,
}

impl Cfa {
    /// Validate the raw graph and compute the derived location flags.
    pub(crate) fn new(
        mut graph: DiGraph<LocationInfo, EdgeKind>,
        functions: Vec<FunctionInfo>,
        main: FunctionId,
    ) -> CfaResult<Self> {
        let function_name = |id: FunctionId| {
            functions
                .get(id.index())
                .map(|info| info.name.clone())
                .ok_or_else(|| CfaError::UnknownFunction {
                    name: format!("#{}", id.0),
                })
        };

        if main.index() >= functions.len() {
            return Err(CfaError::MissingEntry {
                name: format!("#{}", main.0),
            });
        }

        for info in &functions {
            for location in [info.entry, info.exit] {
                if graph.node_weight(location.0).is_none() {
                    return Err(CfaError::DanglingLocation {
                        location: location.to_string(),
                    });
                }
            }
        }

        for edge in graph.edge_references() {
            let from = graph[edge.source()].function;
            let to = graph[edge.target()].function;
            function_name(from)?;
            function_name(to)?;

            match edge.weight() {
                EdgeKind::Call {
                    callee,
                    bindings,
                    return_site,
                } => {
                    let info = functions.get(callee.index()).ok_or_else(|| CfaError::UnknownFunction {
                        name: format!("#{}", callee.0),
                    })?;
                    if bindings.len() != info.params.len() {
                        return Err(CfaError::ArityMismatch {
                            callee: info.name.clone(),
                            expected: info.params.len(),
                            found: bindings.len(),
                        });
                    }
                    match graph.node_weight(return_site.0) {
                        Some(site) if site.function == from => {}
                        Some(_) => {
                            return Err(CfaError::CrossFunctionEdge {
                                from: Location(edge.source()).to_string(),
                                to: return_site.to_string(),
                            });
                        }
                        None => {
                            return Err(CfaError::DanglingLocation {
                                location: return_site.to_string(),
                            });
                        }
                    }
                }
                EdgeKind::Return { .. } => {
                    let info = &functions[from.index()];
                    if info.exit.0 != edge.source() {
                        return Err(CfaError::MisplacedReturn {
                            function: info.name.clone(),
                            return_site: Location(edge.target()).to_string(),
                        });
                    }
                }
                _ if from != to => {
                    return Err(CfaError::CrossFunctionEdge {
                        from: Location(edge.source()).to_string(),
                        to: Location(edge.target()).to_string(),
                    });
                }
                _ => {}
            }
        }

        Self::reject_recursion(&graph, &functions)?;

        // Derived flags; TARGET is the only flag kept from the input.
        for node in graph.node_weights_mut() {
            node.flags &= LocationFlags::TARGET;
        }
        for info in &functions {
            graph[info.entry.0].flags |= LocationFlags::FUNCTION_ENTRY;
            graph[info.exit.0].flags |= LocationFlags::FUNCTION_EXIT;
        }
        let return_sites: Vec<NodeIndex> = graph
            .edge_references()
            .filter(|edge| edge.weight().is_return())
            .map(|edge| edge.target())
            .collect();
        for site in return_sites {
            graph[site].flags |= LocationFlags::CALL_RETURN_SITE;
        }
        let loop_heads = Self::find_loop_heads(&graph, &functions);
        for head in &loop_heads {
            graph[*head].flags |= LocationFlags::LOOP_HEAD;
        }

        debug!(
            "Built CFA with {} location(s), {} edge(s), {} function(s) and {} loop head(s)",
            graph.node_count(),
            graph.edge_count(),
            functions.len(),
            loop_heads.len()
        );

        Ok(Self {
            graph,
            functions,
            main,
        })
    }

    /// Intraprocedural view where each call edge is replaced by a summary edge
    /// from the call site to its return site.
    fn summary_graph(graph: &DiGraph<LocationInfo, EdgeKind>) -> DiGraphMap<NodeIndex, ()> {
        let mut summary = DiGraphMap::new();
        for node in graph.node_indices() {
            summary.add_node(node);
        }
        for edge in graph.edge_references() {
            match edge.weight() {
                EdgeKind::Call { return_site, .. } => {
                    summary.add_edge(edge.source(), return_site.0, ());
                }
                EdgeKind::Return { .. } => {}
                _ => {
                    summary.add_edge(edge.source(), edge.target(), ());
                }
            }
        }
        summary
    }

    fn find_loop_heads(graph: &DiGraph<LocationInfo, EdgeKind>, functions: &[FunctionInfo]) -> BTreeSet<NodeIndex> {
        let summary = Self::summary_graph(graph);
        let mut heads = BTreeSet::new();
        depth_first_search(&summary, functions.iter().map(|info| info.entry.0), |event| {
            if let DfsEvent::BackEdge(_, head) = event {
                heads.insert(head);
            }
        });
        heads
    }

    fn reject_recursion(graph: &DiGraph<LocationInfo, EdgeKind>, functions: &[FunctionInfo]) -> CfaResult<()> {
        let mut calls: DiGraphMap<u32, ()> = DiGraphMap::new();
        for index in 0..functions.len() {
            calls.add_node(index as u32);
        }
        for edge in graph.edge_references() {
            if let EdgeKind::Call { callee, .. } = edge.weight() {
                let caller = graph[edge.source()].function;
                if caller == *callee {
                    return Err(CfaError::RecursiveCall {
                        name: functions[callee.index()].name.clone(),
                    });
                }
                calls.add_edge(caller.0, callee.0, ());
            }
        }

        if let Some(cycle) = tarjan_scc(&calls).into_iter().find(|scc| scc.len() > 1) {
            let first = cycle.into_iter().min().unwrap_or_default();
            return Err(CfaError::RecursiveCall {
                name: functions[first as usize].name.clone(),
            });
        }
        Ok(())
    }

    /// Entry location of the main function.
    pub fn entry(&self) -> Location {
        self.functions[self.main.index()].entry
    }

    pub fn main(&self) -> FunctionId {
        self.main
    }

    pub fn function(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|info| info.name == name)
            .map(|index| FunctionId(index as u32))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionInfo)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, info)| (FunctionId(index as u32), info))
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.graph.node_indices().map(Location)
    }

    pub fn num_locations(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn info(&self, location: Location) -> &LocationInfo {
        &self.graph[location.0]
    }

    pub fn flags(&self, location: Location) -> LocationFlags {
        self.graph[location.0].flags
    }

    pub fn function_of(&self, location: Location) -> FunctionId {
        self.graph[location.0].function
    }

    pub fn edge(&self, id: EdgeId) -> CfaEdge<'_> {
        let raw = &self.graph.raw_edges()[id.index()];
        CfaEdge {
            id,
            predecessor: Location(raw.source()),
            successor: Location(raw.target()),
            kind: &raw.weight,
        }
    }

    fn edges_directed(&self, location: Location, direction: Direction) -> SmallVec<[CfaEdge<'_>; 2]> {
        let mut edges: SmallVec<[CfaEdge<'_>; 2]> = self
            .graph
            .edges_directed(location.0, direction)
            .map(|edge| CfaEdge {
                id: EdgeId(edge.id()),
                predecessor: Location(edge.source()),
                successor: Location(edge.target()),
                kind: edge.weight(),
            })
            .collect();
        edges.sort_by_key(|edge| edge.id);
        edges
    }

    /// Edges leaving `location`, in insertion order.
    pub fn leaving_edges(&self, location: Location) -> SmallVec<[CfaEdge<'_>; 2]> {
        self.edges_directed(location, Direction::Outgoing)
    }

    /// Edges entering `location`, in insertion order.
    pub fn entering_edges(&self, location: Location) -> SmallVec<[CfaEdge<'_>; 2]> {
        self.edges_directed(location, Direction::Incoming)
    }

    pub fn is_loop_head(&self, location: Location) -> bool {
        self.flags(location).contains(LocationFlags::LOOP_HEAD)
    }

    pub fn is_function_entry(&self, location: Location) -> bool {
        self.flags(location).contains(LocationFlags::FUNCTION_ENTRY)
    }

    pub fn is_function_exit(&self, location: Location) -> bool {
        self.flags(location).contains(LocationFlags::FUNCTION_EXIT)
    }

    /// Whether `location` is entered through a return edge.
    pub fn has_call_return_edge(&self, location: Location) -> bool {
        self.flags(location).contains(LocationFlags::CALL_RETURN_SITE)
    }

    pub fn is_target(&self, location: Location) -> bool {
        self.flags(location).contains(LocationFlags::TARGET)
    }

    /// Every program variable mentioned by an edge, sorted.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        for kind in self.graph.edge_weights() {
            kind.collect_variables(&mut vars);
        }
        vars
    }
}
