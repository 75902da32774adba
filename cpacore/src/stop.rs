use std::sync::Arc;

use cpaformal::abstraction::AbstractionManager;
use log::trace;

use crate::{
    arg::{Arg, ArgNodeId},
    reached::ReachedSet,
    state::AbstractState,
    utils::error::{CpaError, CpaResult, Operation},
};

/// Coverage check of the predicate analysis.
#[derive(Debug)]
pub struct PredicateStop {
    abstraction: Arc<AbstractionManager>,
}

impl PredicateStop {
    pub fn new(abstraction: Arc<AbstractionManager>) -> Self {
        Self { abstraction }
    }

    /// Whether `existing` (the state of node `existing_id`) covers `candidate`.
    ///
    /// Both states must agree on location and call stack. Then `candidate` is
    /// covered if both have a trivial path formula and the abstraction of
    /// `candidate` entails the one of `existing`, or if `candidate` carries a
    /// covering hint pointing at `existing_id`.
    pub fn is_covered_by(
        &self,
        candidate: &AbstractState,
        existing: &AbstractState,
        existing_id: ArgNodeId,
    ) -> CpaResult<bool> {
        if candidate.location() != existing.location() || candidate.call_stack() != existing.call_stack() {
            return Ok(false);
        }
        if candidate.covering_hint() == Some(existing_id) {
            return Ok(true);
        }
        if !(candidate.path_formula().is_trivial() && existing.path_formula().is_trivial()) {
            return Ok(false);
        }

        self.abstraction
            .entails(candidate.abstraction(), existing.abstraction())
            .map_err(|e| CpaError::prover(Operation::CoverageCheck, Some(candidate.location()), e))
    }

    /// First reached state, in insertion order, covering `candidate`.
    pub fn stop(&self, candidate: &AbstractState, reached: &ReachedSet, arg: &Arg) -> CpaResult<Option<ArgNodeId>> {
        for &id in reached.at(candidate.location()) {
            if self.is_covered_by(candidate, arg[id].state(), id)? {
                trace!("{candidate} covered by {id:?}");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
