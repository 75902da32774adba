//! Hash-consed reduced ordered binary decision diagrams.
//!
//! Nodes live in a single manager and are never freed; two [`BddRef`]s are
//! equal iff they denote the same Boolean function. Variables are ordered by
//! their numeric id.
use std::collections::HashMap;

/// Handle to a BDD node owned by a [`BddManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BddRef(u32);

impl BddRef {
    pub const FALSE: BddRef = BddRef(0);
    pub const TRUE: BddRef = BddRef(1);

    pub fn is_terminal(self) -> bool {
        self.0 <= 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    var: u32,
    low: BddRef,
    high: BddRef,
}

const TERMINAL_VAR: u32 = u32::MAX;

#[derive(Debug)]
pub struct BddManager {
    nodes: Vec<Node>,
    unique: HashMap<Node, BddRef>,
    ite_cache: HashMap<(BddRef, BddRef, BddRef), BddRef>,
}

impl Default for BddManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BddManager {
    pub fn new() -> Self {
        let terminal = |value: BddRef| Node {
            var: TERMINAL_VAR,
            low: value,
            high: value,
        };
        Self {
            nodes: vec![terminal(BddRef::FALSE), terminal(BddRef::TRUE)],
            unique: HashMap::new(),
            ite_cache: HashMap::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node with variable `var` and the given cofactors, reduced.
    pub fn mk(&mut self, var: u32, low: BddRef, high: BddRef) -> BddRef {
        if low == high {
            return low;
        }
        let node = Node { var, low, high };
        if let Some(existing) = self.unique.get(&node) {
            return *existing;
        }
        let id = BddRef(self.nodes.len() as u32);
        self.nodes.push(node);
        self.unique.insert(node, id);
        id
    }

    pub fn var(&mut self, var: u32) -> BddRef {
        self.mk(var, BddRef::FALSE, BddRef::TRUE)
    }

    /// `(var, low, high)` of an inner node, `None` for terminals.
    pub fn node(&self, f: BddRef) -> Option<(u32, BddRef, BddRef)> {
        if f.is_terminal() {
            return None;
        }
        let node = self.nodes[f.0 as usize];
        Some((node.var, node.low, node.high))
    }

    fn top_var(&self, f: BddRef) -> u32 {
        self.nodes[f.0 as usize].var
    }

    fn cofactors(&self, f: BddRef, var: u32) -> (BddRef, BddRef) {
        let node = self.nodes[f.0 as usize];
        if node.var == var { (node.low, node.high) } else { (f, f) }
    }

    /// If-then-else, the universal BDD operation.
    pub fn ite(&mut self, f: BddRef, g: BddRef, h: BddRef) -> BddRef {
        if f == BddRef::TRUE {
            return g;
        }
        if f == BddRef::FALSE {
            return h;
        }
        if g == h {
            return g;
        }
        if g == BddRef::TRUE && h == BddRef::FALSE {
            return f;
        }
        if let Some(result) = self.ite_cache.get(&(f, g, h)) {
            return *result;
        }

        let var = self.top_var(f).min(self.top_var(g)).min(self.top_var(h));
        let (f0, f1) = self.cofactors(f, var);
        let (g0, g1) = self.cofactors(g, var);
        let (h0, h1) = self.cofactors(h, var);
        let low = self.ite(f0, g0, h0);
        let high = self.ite(f1, g1, h1);
        let result = self.mk(var, low, high);
        self.ite_cache.insert((f, g, h), result);
        result
    }

    pub fn and(&mut self, f: BddRef, g: BddRef) -> BddRef {
        self.ite(f, g, BddRef::FALSE)
    }

    pub fn or(&mut self, f: BddRef, g: BddRef) -> BddRef {
        self.ite(f, BddRef::TRUE, g)
    }

    pub fn not(&mut self, f: BddRef) -> BddRef {
        self.ite(f, BddRef::FALSE, BddRef::TRUE)
    }

    /// Boolean implication `f => g`.
    pub fn implies(&mut self, f: BddRef, g: BddRef) -> bool {
        let not_g = self.not(g);
        self.and(f, not_g) == BddRef::FALSE
    }

    /// Evaluate under a total assignment of the variables.
    pub fn eval(&self, f: BddRef, assignment: impl Fn(u32) -> bool) -> bool {
        let mut current = f;
        while let Some((var, low, high)) = self.node(current) {
            current = if assignment(var) { high } else { low };
        }
        current == BddRef::TRUE
    }

    /// Variables `f` depends on, sorted.
    pub fn support(&self, f: BddRef) -> Vec<u32> {
        let mut stack = vec![f];
        let mut seen = std::collections::BTreeSet::new();
        let mut vars = std::collections::BTreeSet::new();
        while let Some(current) = stack.pop() {
            if let Some((var, low, high)) = self.node(current)
                && seen.insert(current)
            {
                vars.insert(var);
                stack.push(low);
                stack.push(high);
            }
        }
        vars.into_iter().collect()
    }
}
