use std::fmt;

use crate::{formula::Formula, ssa::SsaMap};

/// Strongest postcondition of a block suffix together with the SSA indices
/// reached at its end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathFormula {
    formula: Formula,
    ssa: SsaMap,
}

impl PathFormula {
    pub fn new(formula: Formula, ssa: SsaMap) -> Self {
        Self { formula, ssa }
    }

    /// `(true, {})`: the formula of an empty path.
    pub fn identity() -> Self {
        Self::new(Formula::True, SsaMap::new())
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn ssa(&self) -> &SsaMap {
        &self.ssa
    }

    /// Whether the formula is syntactically `true`.
    pub fn is_trivial(&self) -> bool {
        self.formula.is_true()
    }

    pub fn into_parts(self) -> (Formula, SsaMap) {
        (self.formula, self.ssa)
    }
}

impl fmt::Display for PathFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.formula, self.ssa)
    }
}
