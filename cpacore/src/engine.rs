//! CEGAR exploration loop.
//!
//! [`CpaAlgorithm::run`] alternates exploration rounds and refinements:
//!
//! * a round pops states from a last-in first-out waitlist, computes their
//!   successors, and either records each successor as a covered leaf of the
//!   ARG or adds it to the reached set and the waitlist;
//! * a round stops at the first reachable target state, which is handed to
//!   the [`Refiner`];
//! * a spurious target prunes the ARG below the refinement's restart state.
//!   Survivors that were only covered from the pruned part are explored
//!   again.
//!
//! The loop ends with a fixpoint (safe), a feasible counterexample (unsafe),
//! or when a refinement or time budget runs out (unknown).
use std::time::{Duration, Instant};

use cpaformal::shutdown::ShutdownNotifier;
use log::{debug, info, warn};
use strum::{EnumIs, EnumTryAs};

use crate::{
    arg::{Arg, ArgNodeId},
    cpa::PredicateCpa,
    merge::MergeOperator,
    precision::PredicatePrecision,
    reached::{ReachedSet, Waitlist},
    refiner::{Counterexample, RefinementResult, Refiner},
    state::AbstractState,
    utils::error::{CpaError, CpaResult},
};

/// Fixpoint reached at the final precision.
#[derive(Debug, Clone)]
pub struct FixpointReport {
    /// Reached states in insertion order.
    pub reached: Vec<AbstractState>,
    pub precision: PredicatePrecision,
    pub refinements: usize,
    pub arg_nodes: usize,
    /// ARG leaves that were covered instead of explored.
    pub covered: usize,
}

#[derive(Debug, Clone, EnumIs, EnumTryAs)]
pub enum AnalysisOutcome {
    Safe(FixpointReport),
    Unsafe(Counterexample),
    Unknown { reason: String },
}

enum Round {
    Fixpoint,
    Target(ArgNodeId),
    OutOfTime,
}

pub struct CpaAlgorithm {
    cpa: PredicateCpa,
    refiner: Refiner,
    shutdown: ShutdownNotifier,
    arg: Arg,
    reached: ReachedSet,
    waitlist: Waitlist,
    refinements: usize,
}

impl CpaAlgorithm {
    pub fn new(cpa: PredicateCpa, refiner: Refiner, shutdown: ShutdownNotifier) -> CpaResult<Self> {
        cpa.config().validate()?;
        Ok(Self {
            cpa,
            refiner,
            shutdown,
            arg: Arg::new(),
            reached: ReachedSet::new(),
            waitlist: Waitlist::new(),
            refinements: 0,
        })
    }

    pub fn cpa(&self) -> &PredicateCpa {
        &self.cpa
    }

    pub fn arg(&self) -> &Arg {
        &self.arg
    }

    pub fn reached(&self) -> &ReachedSet {
        &self.reached
    }

    pub fn refinements(&self) -> usize {
        self.refinements
    }

    /// Run the analysis from the initial state of the CFA.
    pub fn run(&mut self) -> CpaResult<AnalysisOutcome> {
        let start = Instant::now();
        let time_limit = self.cpa.config().time_limit_ms.map(Duration::from_millis);
        let max_refinements = self.cpa.config().max_refinements;

        self.reached = ReachedSet::new();
        self.waitlist = Waitlist::new();
        self.refinements = 0;
        let root = self.arg.set_root(self.cpa.initial_state());
        self.reached.add(root, self.arg[root].state().location());
        self.waitlist.push(root);
        info!("Starting analysis at {}", self.arg[root].state());

        loop {
            let target = match self.explore(start, time_limit)? {
                Round::Fixpoint => {
                    info!(
                        "Fixpoint after {} refinement(s): {} reached state(s), {} covered",
                        self.refinements,
                        self.reached.len(),
                        self.arg.num_covered()
                    );
                    return Ok(AnalysisOutcome::Safe(self.report()));
                }
                Round::OutOfTime => {
                    warn!("Time limit reached after {} refinement(s)", self.refinements);
                    return Ok(AnalysisOutcome::Unknown {
                        reason: format!("time limit reached after {} refinement(s)", self.refinements),
                    });
                }
                Round::Target(target) => target,
            };

            match self.refiner.refine(&self.arg, target)? {
                RefinementResult::Feasible(counterexample) => {
                    info!("Counterexample: {counterexample}");
                    return Ok(AnalysisOutcome::Unsafe(counterexample));
                }
                RefinementResult::Spurious(refinement) => {
                    self.refinements += 1;
                    if max_refinements.is_some_and(|max| self.refinements > max) {
                        warn!("Refinement limit reached");
                        return Ok(AnalysisOutcome::Unknown {
                            reason: format!("refinement limit of {} reached", self.refinements - 1),
                        });
                    }
                    self.restart(refinement.restart);
                }
            }
        }
    }

    /// Drop everything below `restart` and explore it again.
    fn restart(&mut self, restart: ArgNodeId) {
        let removed = self.arg.remove_descendants(restart);
        self.reached.remove_all(&removed.removed);
        self.waitlist.remove_all(&removed.removed);

        for id in &removed.uncovered {
            if !self.reached.contains(*id) {
                self.reached.add(*id, self.arg[*id].state().location());
            }
            self.waitlist.push(*id);
        }
        if !self.waitlist.contains(restart) {
            self.waitlist.push(restart);
        }
        debug!(
            "Restart from {}: {} node(s) removed, {} uncovered",
            self.arg[restart].state(),
            removed.removed.len(),
            removed.uncovered.len()
        );
    }

    fn explore(&mut self, start: Instant, time_limit: Option<Duration>) -> CpaResult<Round> {
        let precision = self.cpa.precision().read().clone();
        let cfa = self.cpa.cfa().clone();

        while let Some(id) = self.waitlist.pop() {
            if self.shutdown.should_shutdown() {
                return Err(CpaError::Interrupted {
                    reason: self.shutdown.reason().unwrap_or_else(|| "shutdown requested".to_string()),
                });
            }
            if time_limit.is_some_and(|limit| start.elapsed() >= limit) {
                return Ok(Round::OutOfTime);
            }

            let state = self.arg[id].state().clone();
            let successors = self.cpa.transfer().successors(&state, &precision)?;
            for (edge, successor) in successors {
                let successor = if cfa.is_target(successor.location()) {
                    match self.cpa.transfer().finalize_on_violation(successor, &precision)? {
                        Some(successor) => successor,
                        None => continue,
                    }
                } else {
                    successor
                };

                self.merge_into_reached(&successor);

                if let Some(coverer) = self.cpa.stop().stop(&successor, &self.reached, &self.arg)? {
                    let child = self.arg.add_child(id, edge, successor);
                    self.arg.cover(child, coverer);
                    continue;
                }

                let location = successor.location();
                let child = self.arg.add_child(id, edge, successor);
                self.reached.add(child, location);
                if cfa.is_target(location) {
                    debug!("Target {} reached", self.arg[child].state());
                    return Ok(Round::Target(child));
                }
                self.waitlist.push(child);
            }
        }
        Ok(Round::Fixpoint)
    }

    /// Apply the merge operator against every reached state at the location
    /// of `successor`. Reached states that are replaced lose their covered
    /// nodes, which are explored again.
    fn merge_into_reached(&mut self, successor: &AbstractState) {
        let candidates = self.reached.at(successor.location()).to_vec();
        for id in candidates {
            let Some(merged) = self.cpa.merge().merge(successor, self.arg[id].state()) else {
                continue;
            };
            self.arg.replace_state(id, merged);
            for uncovered in self.arg.uncover_all(id) {
                self.reached.add(uncovered, self.arg[uncovered].state().location());
                self.waitlist.push(uncovered);
            }
            self.waitlist.push(id);
        }
    }

    fn report(&self) -> FixpointReport {
        FixpointReport {
            reached: self.reached.iter().map(|id| self.arg[id].state().clone()).collect(),
            precision: self.cpa.precision().read().clone(),
            refinements: self.refinements,
            arg_nodes: self.arg.len(),
            covered: self.arg.num_covered(),
        }
    }
}
