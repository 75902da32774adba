//! Control-flow automata (CFA) for the predicate-abstraction analysis.
//!
//! Locations are nodes of a `petgraph` directed graph, edges carry typed
//! program operations (assume, assignment, declaration, call, return, blank).
//! Automata are produced with [`CfaBuilder`] and validated on
//! [`CfaBuilder::build`]: unknown callees, cross-function edges and recursion
//! are rejected.

pub mod builder;
pub mod cfa;
pub mod edge;
pub mod error;
pub mod expr;

pub use builder::{CfaBuilder, FunctionBuilder};
pub use cfa::{Cfa, FunctionInfo, Location, LocationFlags, LocationInfo};
pub use edge::{CfaEdge, EdgeId, EdgeKind, EdgeType, FunctionId};
pub use error::{CfaError, CfaResult};
pub use expr::{BinaryOp, CmpOp, Cond, Expr, Var};
