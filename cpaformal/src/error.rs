use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

/// Errors raised while translating CFA operations into formulas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum FormulaError {
    /// The edge has no formula semantics, e.g. a return edge storing into a
    /// variable although the callee returns no value.
    #[error("Edge `{edge}` has no defined formula semantics: {reason}.")]
    UndefinedEdgeSemantics { edge: String, reason: &'static str },

    /// Predicates can only be built from comparison atoms.
    #[error("Formula `{formula}` is not an atom and cannot be used as a predicate.")]
    NotAnAtom { formula: String },
}

pub type FormulaResult<T> = Result<T, FormulaError>;

/// Failures reported by theorem provers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum ProverError {
    /// The prover ran out of its step or memory budget.
    #[error("The prover exhausted its resource budget after {steps} step(s).")]
    ResourceExhausted { steps: u64 },

    #[error("The prover did not answer within {millis} ms.")]
    Timeout { millis: u64 },

    /// The query was cancelled through the shutdown notifier.
    #[error("The prover query was interrupted: {reason}.")]
    Interrupted { reason: String },

    /// The formula uses a construct the prover cannot handle.
    #[error("The prover does not support this query: {0}.")]
    Unsupported(String),

    /// The prover could not produce an interpolant for an unsatisfiable pair.
    #[error("No interpolant could be computed: {0}.")]
    InterpolationUnavailable(String),

    /// Interpolants only exist for unsatisfiable conjunctions.
    #[error("An interpolant was requested but the conjunction of both groups is satisfiable.")]
    Satisfiable,
}

pub type ProverResult<T> = Result<T, ProverError>;
