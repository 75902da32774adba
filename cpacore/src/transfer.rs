//! Transfer relation of the predicate analysis.
//!
//! The successor of a state along an edge depends on whether the edge's
//! successor location is a *block head*:
//!
//! * inside a block, the path formula is extended with the edge and,
//!   optionally, checked for satisfiability together with the last
//!   abstraction;
//! * at a block head, the extended path formula is abstracted with the
//!   predicates tracked at the successor, and the new state starts a fresh
//!   block. An empty abstraction means the successor is unreachable.
//!
//! Return edges into a block head are deferred: the abstraction is computed
//! on the callee side and the return assignment opens the next block.
//!
//! Calls are handled with call strings: a call pushes its return site, and a
//! return edge is only followed back to the site on top of the stack.
use std::sync::Arc;

use cpacfa::{Cfa, CfaEdge, EdgeId, EdgeKind, Location};
use cpaformal::{
    abstraction::AbstractionManager,
    builder::{BlockFormulaCache, PathFormulaManager},
    path_formula::PathFormula,
};
use log::trace;
use smallvec::SmallVec;

use crate::{
    config::AnalysisConfig,
    precision::PredicatePrecision,
    state::{AbstractState, CallStack},
    utils::error::{CpaError, CpaResult, Operation},
};

#[derive(Debug)]
pub struct PredicateTransferRelation {
    cfa: Arc<Cfa>,
    config: AnalysisConfig,
    formulas: PathFormulaManager,
    abstraction: Arc<AbstractionManager>,
    cache: Option<BlockFormulaCache>,
}

impl PredicateTransferRelation {
    pub fn new(cfa: Arc<Cfa>, config: AnalysisConfig, abstraction: Arc<AbstractionManager>) -> Self {
        let cache = config.uses_formula_cache().then(BlockFormulaCache::new);
        Self {
            cfa,
            config,
            formulas: PathFormulaManager::new(),
            abstraction,
            cache,
        }
    }

    pub fn cache(&self) -> Option<&BlockFormulaCache> {
        self.cache.as_ref()
    }

    /// Whether a transition from `state` into `successor` ends the block.
    pub fn is_block_head(&self, state: &AbstractState, successor: Location) -> bool {
        let threshold =
            self.config.block_size > 0 && state.size_since_abstraction() >= self.config.block_size - 1;
        let loop_head = self.cfa.is_loop_head(successor);

        let mut head = if self.config.unroll_loops {
            threshold && loop_head
        } else {
            threshold || loop_head
        };
        if !self.config.inline_functions {
            head |= self.cfa.is_function_entry(successor) || self.cfa.has_call_return_edge(successor);
        }
        head
    }

    /// Successors of `state` along every leaving edge, in edge order.
    pub fn successors(
        &self,
        state: &AbstractState,
        precision: &PredicatePrecision,
    ) -> CpaResult<SmallVec<[(EdgeId, AbstractState); 2]>> {
        let mut successors = SmallVec::new();
        for edge in self.cfa.leaving_edges(state.location()) {
            if let Some(successor) = self.successor(state, precision, edge)? {
                successors.push((edge.id, successor));
            }
        }
        Ok(successors)
    }

    /// Successor of `state` along `edge`, `None` when unreachable.
    pub fn successor(
        &self,
        state: &AbstractState,
        precision: &PredicatePrecision,
        edge: CfaEdge<'_>,
    ) -> CpaResult<Option<AbstractState>> {
        debug_assert_eq!(edge.predecessor, state.location());
        let Some(call_stack) = Self::next_call_stack(state.call_stack(), edge) else {
            return Ok(None);
        };

        if self.is_block_head(state, edge.successor) {
            self.handle_block_head(state, precision, edge, call_stack)
        } else {
            self.handle_block_interior(state, edge, call_stack)
        }
    }

    fn next_call_stack(call_stack: &CallStack, edge: CfaEdge<'_>) -> Option<CallStack> {
        match edge.kind {
            EdgeKind::Call { return_site, .. } => Some(call_stack.push(*return_site)),
            EdgeKind::Return { .. } => match call_stack.pop() {
                Some((site, rest)) if *site == edge.successor => Some(rest),
                _ => None,
            },
            _ => Some(call_stack.clone()),
        }
    }

    fn extend(&self, state: &AbstractState, edge: CfaEdge<'_>) -> CpaResult<PathFormula> {
        let extended = match &self.cache {
            Some(cache) => cache.extend(&self.formulas, state.abstraction_location(), state.path_formula(), edge)?,
            None => self.formulas.extend(state.path_formula(), edge)?,
        };
        Ok(extended)
    }

    fn handle_block_interior(
        &self,
        state: &AbstractState,
        edge: CfaEdge<'_>,
        call_stack: CallStack,
    ) -> CpaResult<Option<AbstractState>> {
        let path_formula = self.extend(state, edge)?;

        let sat_check = self.config.sat_check_block_size > 0
            && state.size_since_abstraction() >= self.config.sat_check_block_size - 1;
        if sat_check
            && self
                .abstraction
                .unsat(state.abstraction(), &path_formula)
                .map_err(|e| CpaError::prover(Operation::SatisfiabilityCheck, Some(edge.successor), e))?
        {
            trace!("Block of {} is unsatisfiable after {edge}", state.abstraction_location());
            return Ok(None);
        }

        Ok(Some(state.interior_successor(edge.successor, path_formula, call_stack)))
    }

    fn handle_block_head(
        &self,
        state: &AbstractState,
        precision: &PredicatePrecision,
        edge: CfaEdge<'_>,
        call_stack: CallStack,
    ) -> CpaResult<Option<AbstractState>> {
        let deferred = edge.kind.is_return();
        let block = if deferred {
            state.path_formula().clone()
        } else {
            self.extend(state, edge)?
        };

        let predicates = precision.predicates_at(edge.successor);
        let abstraction = self
            .abstraction
            .abstract_formula(state.abstraction(), &block, &predicates)
            .map_err(|e| CpaError::prover(Operation::Abstraction, Some(edge.successor), e))?;
        if abstraction.is_false() {
            trace!("Abstraction at {} is false, {edge} is infeasible", edge.successor);
            return Ok(None);
        }

        let path_formula = if deferred {
            self.formulas.extend(&PathFormula::identity(), edge)?
        } else {
            PathFormula::identity()
        };
        Ok(Some(state.abstraction_successor(
            edge.successor,
            abstraction,
            path_formula,
            call_stack,
            deferred,
        )))
    }

    /// Second phase of the successor computation for states at a target
    /// location.
    ///
    /// Returns `None` when the block leading to the violation is infeasible
    /// with respect to the last abstraction. Otherwise the state is closed by
    /// an abstraction at its own location, so that the path to it consists of
    /// complete blocks.
    pub fn finalize_on_violation(
        &self,
        state: AbstractState,
        precision: &PredicatePrecision,
    ) -> CpaResult<Option<AbstractState>> {
        if state.is_abstraction_state() && state.path_formula().is_trivial() {
            return Ok(Some(state));
        }

        let location = state.location();
        if self
            .abstraction
            .unsat(state.abstraction(), state.path_formula())
            .map_err(|e| CpaError::prover(Operation::SatisfiabilityCheck, Some(location), e))?
        {
            trace!("Violation at {location} is infeasible in its block");
            return Ok(None);
        }

        let abstraction = self
            .abstraction
            .abstract_formula(state.abstraction(), state.path_formula(), &precision.predicates_at(location))
            .map_err(|e| CpaError::prover(Operation::Abstraction, Some(location), e))?;
        if abstraction.is_false() {
            return Ok(None);
        }
        Ok(Some(state.abstraction_successor(
            location,
            abstraction,
            PathFormula::identity(),
            state.call_stack().clone(),
            false,
        )))
    }
}

#[cfg(test)]
mod tests {
    use cpacfa::{CfaBuilder, Expr};
    use cpaformal::{abstraction::AbstractFormula, prover::SharedProver, tests_utils::BoundedProver};

    use super::*;

    fn relation(cfa: &Arc<Cfa>, config: AnalysisConfig) -> PredicateTransferRelation {
        let prover: SharedProver = BoundedProver::new().shared();
        PredicateTransferRelation::new(cfa.clone(), config, Arc::new(AbstractionManager::new(prover, true)))
    }

    fn loop_with_call() -> Arc<Cfa> {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        let id = builder.declare("id", &["v"]).unwrap();
        builder
            .define(id, |f| {
                f.ret(Expr::var("v"));
            })
            .unwrap();
        builder
            .define(main, |f| {
                f.assign("x", 0);
                f.while_loop(Expr::var("x").lt(3), |f| {
                    f.call(id, vec![Expr::var("x") + 1], Some("x".into()));
                });
            })
            .unwrap();
        Arc::new(builder.build(main).unwrap())
    }

    #[test]
    fn block_heads_follow_configuration() {
        let cfa = loop_with_call();
        let head = cfa.locations().find(|&l| cfa.is_loop_head(l)).unwrap();
        let id_entry = cfa.function(cfa.function_by_name("id").unwrap()).entry;
        let plain = cfa
            .locations()
            .find(|&l| !cfa.is_loop_head(l) && !cfa.is_function_entry(l) && !cfa.has_call_return_edge(l))
            .unwrap();
        let state = AbstractState::initial(cfa.entry(), AbstractFormula::TRUE);

        let default = relation(&cfa, AnalysisConfig::default());
        assert!(default.is_block_head(&state, head));
        assert!(default.is_block_head(&state, id_entry));
        assert!(!default.is_block_head(&state, plain));

        let inlined = relation(
            &cfa,
            AnalysisConfig {
                inline_functions: true,
                unroll_loops: true,
                ..AnalysisConfig::default()
            },
        );
        assert!(!inlined.is_block_head(&state, head));
        assert!(!inlined.is_block_head(&state, id_entry));

        let single = relation(
            &cfa,
            AnalysisConfig {
                block_size: 1,
                inline_functions: true,
                ..AnalysisConfig::default()
            },
        );
        assert!(single.is_block_head(&state, plain));
    }

    #[test]
    fn returns_only_go_back_to_the_pending_call_site() {
        let cfa = loop_with_call();
        let relation = relation(&cfa, AnalysisConfig::default());
        let precision = PredicatePrecision::new();

        let id_exit = cfa.function(cfa.function_by_name("id").unwrap()).exit;
        let state = AbstractState::initial(id_exit, AbstractFormula::TRUE);
        assert!(relation.successors(&state, &precision).unwrap().is_empty());
    }
}
