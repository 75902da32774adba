//! Indexed program variables.
use std::fmt;

use cpacfa::Var;

/// A program variable, optionally tagged with an SSA index.
///
/// Formulas built from CFA edges always carry indices; predicates are stored
/// unindexed and instantiated against an [`SsaMap`](crate::ssa::SsaMap) when
/// they are used.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    pub var: Var,
    pub index: Option<u32>,
}

impl Symbol {
    pub fn indexed(var: Var, index: u32) -> Self {
        Self {
            var,
            index: Some(index),
        }
    }

    pub fn unindexed(var: Var) -> Self {
        Self { var, index: None }
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn without_index(&self) -> Self {
        Self::unindexed(self.var.clone())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}@{index}", self.var),
            None => write!(f, "{}", self.var),
        }
    }
}
