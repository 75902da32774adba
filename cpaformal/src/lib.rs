//! Formal layer of the predicate-abstraction analysis.
//!
//! This crate turns CFA operations into quantifier-free formulas and
//! abstracts them over a set of predicates:
//!
//! - [`formula`]: terms and formulas in negation normal form, with SSA-indexed
//!   symbols ([`variable::Symbol`]) and a pretty-printer;
//! - [`ssa`] and [`path_formula`]: immutable version maps and the
//!   `(formula, ssa)` pairs produced by symbolic execution;
//! - [`builder`]: strongest postconditions of CFA edges and their memoization;
//! - [`bdd`] and [`abstraction`]: canonical Boolean abstractions over
//!   interned predicates;
//! - [`prover`]: the theorem-prover capabilities the analysis relies on;
//! - [`shutdown`]: cooperative cancellation shared with provers.
//!
//! Example
//! ```
//! use cpacfa::{CmpOp, Var};
//! use cpaformal::prelude::*;
//!
//! let x = Symbol::indexed(Var::new("x"), 1);
//! let f = Formula::compare(CmpOp::Gt, x.clone(), 0) & Formula::compare(CmpOp::Lt, x, 5);
//! assert_eq!(f.to_string(), "x@1 > 0 && x@1 < 5");
//! assert_eq!(f.negate().atoms().len(), 2);
//! ```

/// Boolean abstractions over interned predicates.
pub mod abstraction;
/// Reduced ordered binary decision diagrams.
pub mod bdd;
/// Symbolic execution of CFA edges.
pub mod builder;
/// Error types of formula construction and prover queries.
pub mod error;
/// Terms and formulas.
pub mod formula;
/// Path formulas.
pub mod path_formula;
/// Prover interfaces.
pub mod prover;
/// Cancellation.
pub mod shutdown;
/// SSA version maps.
pub mod ssa;
/// Indexed symbols.
pub mod variable;

#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;

pub mod prelude {
    //! Convenient re-exports for end users.
    pub use crate::abstraction::{AbstractFormula, AbstractionManager, PredicateId};
    pub use crate::builder::{BlockFormulaCache, PathFormulaManager};
    pub use crate::error::{FormulaError, FormulaResult, ProverError, ProverResult};
    pub use crate::formula::{Formula, Term};
    pub use crate::path_formula::PathFormula;
    pub use crate::prover::{GroupId, InterpolatingProver, SharedInterpolatingProver, SharedProver, TheoremProver};
    pub use crate::shutdown::ShutdownNotifier;
    pub use crate::ssa::SsaMap;
    pub use crate::variable::Symbol;
}
