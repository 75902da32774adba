//! Typed CFA edges.
use std::{collections::BTreeSet, fmt};

use auto_enums::auto_enum;
use petgraph::graph::EdgeIndex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumDiscriminants, EnumIs, EnumTryAs, IntoStaticStr};

use crate::{
    cfa::Location,
    expr::{Cond, Expr, Var},
};

/// Index of a function inside its [`Cfa`](crate::Cfa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable edge handle. Edges are never removed from a built CFA, so ids are
/// valid for the whole lifetime of the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeId(pub(crate) EdgeIndex);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0.index())
    }
}

/// Operation attached to a CFA edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(EdgeType), derive(IntoStaticStr, Hash))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EdgeKind {
    /// Guard; taken when `cond` evaluates to `branch`.
    Assume { cond: Cond, branch: bool },
    Assignment { lhs: Var, rhs: Expr },
    /// Declaration of a variable with an optional initializer. Without
    /// initializer the variable holds an unconstrained value.
    Declaration { var: Var, init: Option<Expr> },
    /// Jump from a call site to the entry of `callee`. `bindings` assign the
    /// actual arguments (over the caller's variables) to the formal parameters.
    Call {
        callee: FunctionId,
        bindings: Vec<(Var, Expr)>,
        return_site: Location,
    },
    /// Jump from the exit of a function back to one of its return sites.
    /// `value` is evaluated in the callee and stored into `result`.
    Return {
        value: Option<Expr>,
        result: Option<Var>,
    },
    Blank,
}

impl EdgeKind {
    pub fn edge_type(&self) -> EdgeType {
        self.into()
    }

    /// Expressions evaluated when the edge is taken.
    #[auto_enum(Iterator)]
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        match self {
            EdgeKind::Assume { .. } => std::iter::empty(),
            EdgeKind::Assignment { rhs, .. } => std::iter::once(rhs),
            EdgeKind::Declaration { init, .. } => init.iter(),
            EdgeKind::Call { bindings, .. } => bindings.iter().map(|(_, actual)| actual),
            EdgeKind::Return { value, .. } => value.iter(),
            EdgeKind::Blank => std::iter::empty(),
        }
    }

    /// Variables receiving a new value when the edge is taken.
    #[auto_enum(Iterator)]
    pub fn written_variables(&self) -> impl Iterator<Item = &Var> {
        match self {
            EdgeKind::Assume { .. } => std::iter::empty(),
            EdgeKind::Assignment { lhs, .. } => std::iter::once(lhs),
            EdgeKind::Declaration { var, .. } => std::iter::once(var),
            EdgeKind::Call { bindings, .. } => bindings.iter().map(|(formal, _)| formal),
            EdgeKind::Return { result, .. } => result.iter(),
            EdgeKind::Blank => std::iter::empty(),
        }
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        if let EdgeKind::Assume { cond, .. } = self {
            cond.collect_variables(out);
        }
        self.expressions().for_each(|expr| expr.collect_variables(out));
        out.extend(self.written_variables().cloned());
    }

    /// Call and return edges leave the current function.
    pub fn is_interprocedural(&self) -> bool {
        matches!(self, EdgeKind::Call { .. } | EdgeKind::Return { .. })
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Assume { cond, branch: true } => write!(f, "[{cond}]"),
            EdgeKind::Assume { cond, branch: false } => write!(f, "[!({cond})]"),
            EdgeKind::Assignment { lhs, rhs } => write!(f, "{lhs} := {rhs}"),
            EdgeKind::Declaration { var, init: Some(init) } => write!(f, "decl {var} := {init}"),
            EdgeKind::Declaration { var, init: None } => write!(f, "decl {var}"),
            EdgeKind::Call { callee, bindings, .. } => {
                write!(f, "call f{}(", callee.0)?;
                for (i, (formal, actual)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{formal} := {actual}")?;
                }
                write!(f, ")")
            }
            EdgeKind::Return { value, result } => {
                write!(f, "return")?;
                if let Some(value) = value {
                    write!(f, " {value}")?;
                }
                if let Some(result) = result {
                    write!(f, " -> {result}")?;
                }
                Ok(())
            }
            EdgeKind::Blank => write!(f, "skip"),
        }
    }
}

/// Borrowed view of an edge together with its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CfaEdge<'a> {
    pub id: EdgeId,
    pub predecessor: Location,
    pub successor: Location,
    pub kind: &'a EdgeKind,
}

impl fmt::Display for CfaEdge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{{{}}}-> {}", self.predecessor, self.kind, self.successor)
    }
}
