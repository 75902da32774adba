use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum CfaError {
    /// A function was declared twice with the same name.
    #[error("Function `{name}` is declared more than once. Function names must be unique within a CFA.")]
    DuplicateFunction { name: String },

    /// A function identifier or name does not resolve to a declared function.
    #[error("Function `{name}` is referenced but was never declared.")]
    UnknownFunction { name: String },

    /// A function was declared but its body was never defined.
    #[error("Function `{name}` was declared but has no body. Every declared function must be defined before the CFA is built.")]
    MissingBody { name: String },

    /// A function body was defined twice.
    #[error("Function `{name}` already has a body.")]
    AlreadyDefined { name: String },

    /// The main function cannot be found, thus the CFA has no entry location.
    #[error("The CFA has no entry location: main function `{name}` is not part of the automaton.")]
    MissingEntry { name: String },

    /// Direct or mutual recursion between functions.
    #[error("Function `{name}` is (mutually) recursive. Recursive calls cannot be handled with call-string semantics.")]
    RecursiveCall { name: String },

    /// An intraprocedural edge connects locations of two different functions.
    #[error("Edge from {from} to {to} crosses function boundaries without being a call or a return edge.")]
    CrossFunctionEdge { from: String, to: String },

    /// Referenced location does not exist in the automaton.
    #[error("Location {location} is referenced by an edge but does not belong to the automaton.")]
    DanglingLocation { location: String },

    /// Number of actual arguments of a call does not match the callee's parameters.
    #[error("Call to function `{callee}` passes {found} argument(s), but the function declares {expected} parameter(s).")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    /// Return edges must leave the exit location of a function.
    #[error("Return edge towards {return_site} does not leave the exit location of function `{function}`.")]
    MisplacedReturn {
        function: String,
        return_site: String,
    },
}

pub type CfaResult<T> = Result<T, CfaError>;
