//! Abstract reachability graph (ARG).
//!
//! Explored states live in an arena indexed by stable [`ArgNodeId`] handles.
//! Each node records its parent, the edge it was reached by and its children,
//! plus both directions of the covering relation: the set of nodes it covers
//! and the node covering it.
//!
//! Covering evidence is only valid as long as the covering node exists, so
//! pruning a subtree always uncovers whatever the pruned nodes covered.
use std::{collections::BTreeSet, ops::Index};

use cpacfa::EdgeId;
use log::trace;
use slotmap::{SlotMap, new_key_type};

use crate::state::AbstractState;

new_key_type! {
    /// Handle of an ARG node. Handles are never reused after removal.
    pub struct ArgNodeId;
}

#[derive(Debug, Clone)]
pub struct ArgNode {
    state: AbstractState,
    parent: Option<ArgNodeId>,
    edge: Option<EdgeId>,
    children: Vec<ArgNodeId>,
    covers: BTreeSet<ArgNodeId>,
    covered_by: Option<ArgNodeId>,
    discovery: u64,
}

impl ArgNode {
    pub fn state(&self) -> &AbstractState {
        &self.state
    }

    pub fn parent(&self) -> Option<ArgNodeId> {
        self.parent
    }

    /// Edge from the parent to this node.
    pub fn edge(&self) -> Option<EdgeId> {
        self.edge
    }

    pub fn children(&self) -> &[ArgNodeId] {
        &self.children
    }

    /// Nodes covered by this node.
    pub fn covers(&self) -> &BTreeSet<ArgNodeId> {
        &self.covers
    }

    pub fn covered_by(&self) -> Option<ArgNodeId> {
        self.covered_by
    }

    /// Position of the node in discovery order.
    pub fn discovery(&self) -> u64 {
        self.discovery
    }
}

/// Nodes affected by [`Arg::remove_descendants`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedSubtree {
    pub removed: BTreeSet<ArgNodeId>,
    /// Surviving nodes that lost their covering.
    pub uncovered: BTreeSet<ArgNodeId>,
}

#[derive(Debug, Default)]
pub struct Arg {
    nodes: SlotMap<ArgNodeId, ArgNode>,
    root: Option<ArgNodeId>,
    discoveries: u64,
}

impl Arg {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, state: AbstractState, parent: Option<ArgNodeId>, edge: Option<EdgeId>) -> ArgNodeId {
        let discovery = self.discoveries;
        self.discoveries += 1;
        self.nodes.insert(ArgNode {
            state,
            parent,
            edge,
            children: Vec::new(),
            covers: BTreeSet::new(),
            covered_by: None,
            discovery,
        })
    }

    /// Start a new graph rooted at `state`. Any previous content is dropped.
    pub fn set_root(&mut self, state: AbstractState) -> ArgNodeId {
        self.nodes.clear();
        let root = self.insert(state, None, None);
        self.root = Some(root);
        root
    }

    pub fn add_child(&mut self, parent: ArgNodeId, edge: EdgeId, state: AbstractState) -> ArgNodeId {
        let child = self.insert(state, Some(parent), Some(edge));
        self.nodes[parent].children.push(child);
        child
    }

    pub fn root(&self) -> Option<ArgNodeId> {
        self.root
    }

    pub fn get(&self, id: ArgNodeId) -> Option<&ArgNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArgNodeId, &ArgNode)> {
        self.nodes.iter()
    }

    pub(crate) fn replace_state(&mut self, id: ArgNodeId, state: AbstractState) {
        self.nodes[id].state = state;
    }

    /// Whether `ancestor` lies on the path from the root to `node` (inclusive).
    pub fn is_ancestor(&self, ancestor: ArgNodeId, node: ArgNodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(ArgNode::parent);
        }
        false
    }

    /// Nodes from the root to `node`, both included.
    pub fn path_to(&self, node: ArgNodeId) -> Vec<ArgNodeId> {
        let mut path = Vec::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.nodes.get(current).and_then(ArgNode::parent);
        }
        path.reverse();
        path
    }

    /// Nodes of the subtree under `root` in depth-first preorder.
    pub fn subtree(&self, root: ArgNodeId, include_root: bool) -> Vec<ArgNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if current != root || include_root {
                out.push(current);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Register that `target` covers `covered`. Idempotent.
    ///
    /// The covering node must be uncovered, share the location of the covered
    /// node, be discovered strictly earlier and not lie below it.
    pub fn cover(&mut self, covered: ArgNodeId, target: ArgNodeId) {
        debug_assert!(covered != target, "a node cannot cover itself");
        debug_assert_eq!(
            self.nodes[covered].state.location(),
            self.nodes[target].state.location(),
            "covering between different locations"
        );
        debug_assert!(
            self.nodes[target].discovery < self.nodes[covered].discovery,
            "covering node must be discovered before the covered node"
        );
        debug_assert!(
            !self.is_ancestor(covered, target),
            "covering node lies in the subtree of the covered node"
        );
        debug_assert!(!self.is_covered(target), "covering node is itself covered");

        match self.nodes[covered].covered_by {
            Some(previous) if previous == target => return,
            Some(previous) => {
                if let Some(node) = self.nodes.get_mut(previous) {
                    node.covers.remove(&covered);
                }
            }
            None => {}
        }
        trace!("{:?} covered by {:?}", covered, target);
        self.nodes[target].covers.insert(covered);
        self.nodes[covered].covered_by = Some(target);
    }

    /// Remove and return every node covered by `target`.
    pub fn uncover_all(&mut self, target: ArgNodeId) -> BTreeSet<ArgNodeId> {
        let Some(node) = self.nodes.get_mut(target) else {
            return BTreeSet::new();
        };
        let uncovered = std::mem::take(&mut node.covers);
        for id in &uncovered {
            if let Some(node) = self.nodes.get_mut(*id) {
                node.covered_by = None;
            }
        }
        uncovered
    }

    /// Uncover everything covered by a node strictly below `root`.
    pub fn remove_descendants_from_covering(&mut self, root: ArgNodeId) -> BTreeSet<ArgNodeId> {
        let mut uncovered = BTreeSet::new();
        for id in self.subtree(root, false) {
            uncovered.append(&mut self.uncover_all(id));
        }
        uncovered
    }

    /// Detach and delete the subtree strictly below `root`.
    ///
    /// Nodes covered from inside the subtree are uncovered first, and removed
    /// nodes are unregistered from their own covering nodes.
    pub fn remove_descendants(&mut self, root: ArgNodeId) -> RemovedSubtree {
        let mut uncovered = self.remove_descendants_from_covering(root);
        let removed: BTreeSet<ArgNodeId> = self.subtree(root, false).into_iter().collect();

        for id in &removed {
            if let Some(node) = self.nodes.remove(*id)
                && let Some(coverer) = node.covered_by
                && let Some(coverer) = self.nodes.get_mut(coverer)
            {
                coverer.covers.remove(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(root) {
            node.children.clear();
        }

        uncovered.retain(|id| !removed.contains(id));
        trace!(
            "Removed {} node(s) below {:?}, {} node(s) uncovered",
            removed.len(),
            root,
            uncovered.len()
        );
        RemovedSubtree { removed, uncovered }
    }

    /// Covered nodes and nodes with a false abstraction are covered.
    pub fn is_covered(&self, id: ArgNodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|node| node.covered_by.is_some() || node.state.abstraction().is_false())
    }

    /// Number of nodes currently covered by another node.
    pub fn num_covered(&self) -> usize {
        self.nodes.values().filter(|node| node.covered_by.is_some()).count()
    }
}

impl Index<ArgNodeId> for Arg {
    type Output = ArgNode;

    fn index(&self, id: ArgNodeId) -> &ArgNode {
        &self.nodes[id]
    }
}
