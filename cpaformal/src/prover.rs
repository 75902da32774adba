//! Capabilities expected from external theorem provers.
//!
//! The analysis never decides formulas itself. It talks to a prover through
//! two traits: an incremental satisfiability checker with a context stack,
//! and an interpolating prover that partitions assertions into groups.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{error::ProverResult, formula::Formula};

pub trait TheoremProver: Send {
    fn push_context(&mut self);

    /// Drop every assertion made since the matching [`push_context`](Self::push_context).
    fn pop_context(&mut self);

    fn assert_formula(&mut self, formula: &Formula) -> ProverResult<()>;

    /// Satisfiability of the conjunction of all current assertions.
    fn check_sat(&mut self) -> ProverResult<bool>;

    fn is_sat(&mut self, formula: &Formula) -> ProverResult<bool> {
        self.push_context();
        let result = self.assert_formula(formula).and_then(|()| self.check_sat());
        self.pop_context();
        result
    }

    /// Validity of `premise => conclusion`.
    fn entails(&mut self, premise: &Formula, conclusion: &Formula) -> ProverResult<bool> {
        let counter = Formula::and([premise.clone(), conclusion.negate()]);
        Ok(!self.is_sat(&counter)?)
    }
}

/// Handle of an assertion group inside an [`InterpolatingProver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

pub trait InterpolatingProver: Send {
    fn add_group(&mut self, formula: &Formula) -> ProverResult<GroupId>;

    /// Satisfiability of the conjunction of all groups.
    fn check_sat(&mut self) -> ProverResult<bool>;

    /// Craig interpolant `I` of `A = ∧ group_a` and `B = ∧ group_b`:
    /// `A => I`, `I ∧ B` unsatisfiable, and `I` only mentions symbols common
    /// to `A` and `B`.
    fn get_interpolant(&mut self, group_a: &[GroupId], group_b: &[GroupId]) -> ProverResult<Formula>;

    /// Forget every group.
    fn reset(&mut self);
}

pub type SharedProver = Arc<Mutex<dyn TheoremProver>>;
pub type SharedInterpolatingProver = Arc<Mutex<dyn InterpolatingProver>>;
