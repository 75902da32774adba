//! Predicate-abstraction analysis as a configurable program analysis (CPA),
//! with covering and counterexample-guided refinement.
//!
//! The analysis explores a [`cpacfa::Cfa`] and builds an abstract reachability
//! graph ([`arg::Arg`]). Paths are summarized into path formulas between
//! abstraction points, where they are abstracted over the predicates of the
//! current [`precision::PredicatePrecision`]. When a target location becomes
//! reachable, the [`refiner::Refiner`] either confirms the path or adds the
//! atoms of Craig interpolants as new predicates and restarts exploration
//! below the first refined abstraction point.
//!
//! Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use cpacfa::Cfa;
//! use cpacore::prelude::*;
//! use cpaformal::prelude::*;
//!
//! fn check(cfa: Arc<Cfa>, prover: SharedProver, itp: SharedInterpolatingProver) -> CpaResult<AnalysisOutcome> {
//!     let cpa = PredicateCpa::new(cfa.clone(), AnalysisConfig::default(), prover)?;
//!     let refiner = Refiner::new(cfa, cpa.abstraction().clone(), itp, cpa.precision().clone());
//!     CpaAlgorithm::new(cpa, refiner, ShutdownNotifier::new())?.run()
//! }
//! ```

/// Abstract reachability graph and covering.
pub mod arg;
/// Analysis options.
pub mod config;
pub mod cpa;
/// The CEGAR loop.
pub mod engine;
pub mod merge;
/// Predicates tracked per location.
pub mod precision;
pub mod reached;
/// Interpolation-based refinement.
pub mod refiner;
pub mod state;
pub mod stop;
/// Transfer relation with block-wise abstraction.
pub mod transfer;
pub mod utils;

pub mod prelude {
    //! Convenient re-exports for end users.
    pub use crate::arg::{Arg, ArgNode, ArgNodeId};
    pub use crate::config::{AnalysisConfig, Traversal};
    pub use crate::cpa::PredicateCpa;
    pub use crate::engine::{AnalysisOutcome, CpaAlgorithm, FixpointReport};
    pub use crate::merge::{MergeOperator, MergeSep};
    pub use crate::precision::{PredicatePrecision, SharedPrecision};
    pub use crate::reached::{ReachedSet, Waitlist};
    pub use crate::refiner::{Counterexample, Refinement, RefinementResult, Refiner};
    pub use crate::state::{AbstractState, CallStack};
    pub use crate::stop::PredicateStop;
    pub use crate::transfer::PredicateTransferRelation;
    pub use crate::utils::error::{CpaError, CpaResult, Operation};
}
