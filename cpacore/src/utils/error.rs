use std::fmt;

use cpacfa::{CfaError, Location};
use cpaformal::error::{FormulaError, ProverError};
use strum::{EnumIs, EnumTryAs, IntoStaticStr};
use thiserror::Error;

/// Step of the analysis during which a prover query was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Operation {
    Abstraction,
    SatisfiabilityCheck,
    CoverageCheck,
    FeasibilityCheck,
    Interpolation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

fn location_suffix(location: &Option<Location>) -> String {
    location.map(|location| format!(" at {location}")).unwrap_or_default()
}

#[derive(Debug, Error, EnumIs, EnumTryAs)]
pub enum CpaError {
    /// The analysis configuration cannot be used, e.g. breadth-first traversal.
    #[error("Invalid analysis configuration: {0}")]
    Config(String),

    #[error("Failed to parse analysis configuration: {source}")]
    ConfigParse { source: toml::de::Error },

    #[error(transparent)]
    Cfa(#[from] CfaError),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// A prover query failed outside of refinement. The run is aborted.
    #[error("Prover failure during {operation}{}: {source}", location_suffix(.location))]
    Prover {
        operation: Operation,
        location: Option<Location>,
        source: ProverError,
    },

    /// Refinement could not make progress on a spurious counterexample.
    #[error("Refinement is inconclusive: {reason}")]
    Inconclusive { reason: String },

    #[error("Analysis interrupted: {reason}")]
    Interrupted { reason: String },

    /// Internal invariant violation. Never retried.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CpaError {
    /// Tag a prover failure with the operation that triggered it. Interrupted
    /// queries are reported as an interruption of the whole analysis.
    pub fn prover(operation: Operation, location: Option<Location>, source: ProverError) -> Self {
        match source {
            ProverError::Interrupted { reason } => CpaError::Interrupted { reason },
            source => CpaError::Prover {
                operation,
                location,
                source,
            },
        }
    }

    /// Prover failure during refinement: the round is abandoned.
    pub fn refinement(operation: Operation, source: ProverError) -> Self {
        match source {
            ProverError::Interrupted { reason } => CpaError::Interrupted { reason },
            source => CpaError::Inconclusive {
                reason: format!("{operation} failed: {source}"),
            },
        }
    }
}

pub type CpaResult<T> = Result<T, CpaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruptions_are_not_prover_failures() {
        let interrupted = CpaError::prover(
            Operation::Abstraction,
            None,
            ProverError::Interrupted {
                reason: "user".to_string(),
            },
        );
        assert!(interrupted.is_interrupted());

        let exhausted = CpaError::prover(Operation::CoverageCheck, None, ProverError::ResourceExhausted { steps: 3 });
        assert!(exhausted.to_string().starts_with("Prover failure during coverage-check"));

        let inconclusive = CpaError::refinement(Operation::Interpolation, ProverError::Satisfiable);
        assert!(inconclusive.is_inconclusive());
    }
}
