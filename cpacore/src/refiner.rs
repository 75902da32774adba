//! Counterexample-guided refinement with sequence interpolants.
//!
//! The path from the ARG root to a target is cut into blocks at its
//! abstraction states. Block formulas are rebuilt with one continuous SSA
//! numbering, so that their conjunction describes exactly the concrete
//! executions of the path:
//!
//! 1. if the conjunction is satisfiable, the path is a real counterexample;
//! 2. otherwise an interpolant is computed at every block boundary, between
//!    the blocks before it and the blocks after it;
//! 3. the atoms of each interpolant become predicates at the location that
//!    ends the block before the boundary.
//!
//! The precision is only updated once every interpolant was obtained, so an
//! interrupted or failed refinement leaves no trace.
use std::{collections::BTreeSet, fmt, sync::Arc};

use cpacfa::{Cfa, EdgeId, Location};
use cpaformal::{
    abstraction::{AbstractionManager, PredicateId},
    builder::PathFormulaManager,
    formula::Formula,
    path_formula::PathFormula,
    prover::SharedInterpolatingProver,
};
use log::{debug, info};
use strum::{EnumIs, EnumTryAs};

use crate::{
    arg::{Arg, ArgNodeId},
    precision::SharedPrecision,
    utils::error::{CpaError, CpaResult, Operation},
};

/// Feasible path from the root to a target state.
#[derive(Debug, Clone)]
pub struct Counterexample {
    pub states: Vec<ArgNodeId>,
    pub locations: Vec<Location>,
    pub edges: Vec<EdgeId>,
    /// Path formula of the prefix ending with each edge.
    pub steps: Vec<PathFormula>,
    /// Formula of every block, over the SSA numbering of `steps`.
    pub blocks: Vec<Formula>,
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.locations.first() else {
            return Ok(());
        };
        write!(f, "{first}")?;
        for (edge, location) in self.edges.iter().zip(&self.locations[1..]) {
            write!(f, " -{edge}-> {location}")?;
        }
        Ok(())
    }
}

/// Predicates added by a successful refinement.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Abstraction state from which exploration restarts. Its descendants
    /// are obsolete.
    pub restart: ArgNodeId,
    pub new_predicates: usize,
    pub interpolants: Vec<Formula>,
}

#[derive(Debug, Clone, EnumIs, EnumTryAs)]
pub enum RefinementResult {
    Feasible(Counterexample),
    Spurious(Refinement),
}

struct Block {
    start: ArgNodeId,
    end: ArgNodeId,
    formula: Formula,
}

struct Trace {
    blocks: Vec<Block>,
    edges: Vec<EdgeId>,
    steps: Vec<PathFormula>,
}

pub struct Refiner {
    cfa: Arc<Cfa>,
    formulas: PathFormulaManager,
    abstraction: Arc<AbstractionManager>,
    prover: SharedInterpolatingProver,
    precision: SharedPrecision,
}

impl Refiner {
    pub fn new(
        cfa: Arc<Cfa>,
        abstraction: Arc<AbstractionManager>,
        prover: SharedInterpolatingProver,
        precision: SharedPrecision,
    ) -> Self {
        Self {
            cfa,
            formulas: PathFormulaManager::new(),
            abstraction,
            prover,
            precision,
        }
    }

    fn trace(&self, arg: &Arg, path: &[ArgNodeId]) -> CpaResult<Trace> {
        let Some((&root, rest)) = path.split_first() else {
            return Err(CpaError::Internal("refinement of an empty path".to_string()));
        };

        let mut trace = Trace {
            blocks: Vec::new(),
            edges: Vec::with_capacity(rest.len()),
            steps: Vec::with_capacity(rest.len()),
        };
        let mut start = root;
        let mut block = PathFormula::identity();
        let mut cumulative = PathFormula::identity();

        for &id in rest {
            let node = &arg[id];
            let Some(edge_id) = node.edge() else {
                return Err(CpaError::Internal(format!("ARG node {id:?} has no incoming edge")));
            };
            let edge = self.cfa.edge(edge_id);
            let state = node.state();

            if state.is_abstraction_state() && state.has_deferred_return() {
                trace.blocks.push(Block {
                    start,
                    end: id,
                    formula: block.formula().clone(),
                });
                start = id;
                block = self.formulas.extend(&PathFormula::new(Formula::True, block.ssa().clone()), edge)?;
            } else {
                block = self.formulas.extend(&block, edge)?;
                if state.is_abstraction_state() {
                    trace.blocks.push(Block {
                        start,
                        end: id,
                        formula: block.formula().clone(),
                    });
                    start = id;
                    block = PathFormula::new(Formula::True, block.ssa().clone());
                }
            }

            cumulative = self.formulas.extend(&cumulative, edge)?;
            trace.steps.push(cumulative.clone());
            trace.edges.push(edge_id);
        }

        if let Some(&last) = rest.last()
            && start != last
        {
            trace.blocks.push(Block {
                start,
                end: last,
                formula: block.formula().clone(),
            });
        }
        Ok(trace)
    }

    pub fn precision(&self) -> &SharedPrecision {
        &self.precision
    }

    /// Refine the precision with the path from the ARG root to `target`, or
    /// report the path when it is feasible.
    pub fn refine(&self, arg: &Arg, target: ArgNodeId) -> CpaResult<RefinementResult> {
        let path = arg.path_to(target);
        let trace = self.trace(arg, &path)?;
        debug!(
            "Refining path of {} edge(s) in {} block(s)",
            trace.edges.len(),
            trace.blocks.len()
        );

        let interpolants = {
            let mut prover = self.prover.lock();
            prover.reset();
            let groups = trace
                .blocks
                .iter()
                .map(|block| prover.add_group(&block.formula))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CpaError::refinement(Operation::FeasibilityCheck, e))?;

            if prover
                .check_sat()
                .map_err(|e| CpaError::refinement(Operation::FeasibilityCheck, e))?
            {
                info!("Found a feasible counterexample of {} edge(s)", trace.edges.len());
                return Ok(RefinementResult::Feasible(Counterexample {
                    locations: path.iter().map(|id| arg[*id].state().location()).collect(),
                    states: path,
                    edges: trace.edges,
                    steps: trace.steps,
                    blocks: trace.blocks.into_iter().map(|block| block.formula).collect(),
                }));
            }

            let mut interpolants = Vec::with_capacity(groups.len().saturating_sub(1));
            for split in 1..groups.len() {
                let interpolant = prover
                    .get_interpolant(&groups[..split], &groups[split..])
                    .map_err(|e| CpaError::refinement(Operation::Interpolation, e))?;
                interpolants.push(interpolant);
            }
            interpolants
        };

        let additions: Vec<(Location, Vec<PredicateId>)> = interpolants
            .iter()
            .zip(&trace.blocks)
            .map(|(interpolant, block)| {
                let location = arg[block.end].state().location();
                (location, self.abstraction.extract_predicates(interpolant))
            })
            .collect();

        let mut precision = self.precision.write();
        let mut refined = BTreeSet::new();
        let mut new_predicates = 0;
        for (location, predicates) in additions {
            let added = precision.add_all(location, predicates);
            if added > 0 {
                refined.insert(location);
                new_predicates += added;
            }
        }
        drop(precision);

        let Some(first) = trace
            .blocks
            .iter()
            .find(|block| refined.contains(&arg[block.end].state().location()))
        else {
            return Err(CpaError::Inconclusive {
                reason: format!(
                    "the path to {} is spurious but its interpolants yield no new predicate",
                    arg[target].state().location()
                ),
            });
        };

        debug!(
            "Added {new_predicates} predicate(s) at {} location(s), restarting from {}",
            refined.len(),
            arg[first.start].state()
        );
        Ok(RefinementResult::Spurious(Refinement {
            restart: first.start,
            new_predicates,
            interpolants,
        }))
    }
}
