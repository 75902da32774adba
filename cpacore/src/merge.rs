use crate::state::AbstractState;

/// Merge operator of a configurable program analysis.
///
/// A joining operator that widens a reached state may also attach a
/// covering hint to it with [`AbstractState::with_covering_hint`], which the
/// stop operator accepts without an entailment check.
pub trait MergeOperator {
    /// Combine a new `successor` with a `reached` state at the same location.
    /// `None` keeps `reached` as it is.
    fn merge(&self, successor: &AbstractState, reached: &AbstractState) -> Option<AbstractState>;
}

/// Never merges. Join points are handled by covering instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSep;

impl MergeOperator for MergeSep {
    fn merge(&self, _successor: &AbstractState, _reached: &AbstractState) -> Option<AbstractState> {
        None
    }
}

#[cfg(test)]
mod tests {
    use cpacfa::{CfaBuilder, Expr};
    use cpaformal::abstraction::AbstractFormula;

    use super::*;

    #[test]
    fn separate_merge_keeps_reached_states() {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        builder
            .define(main, |f| {
                f.assume(Expr::var("x").gt(0));
            })
            .unwrap();
        let cfa = builder.build(main).unwrap();

        let state = AbstractState::initial(cfa.entry(), AbstractFormula::TRUE);
        assert!(MergeSep.merge(&state, &state).is_none());
    }
}
