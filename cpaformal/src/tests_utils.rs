//! Test doubles for the prover interfaces.
//!
//! [`BoundedProver`] decides formulas by exhaustive search over a bounded
//! integer domain. Results are exact for that domain only, which is all the
//! analysis tests need: their programs never leave the bounds.
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use cpacfa::CmpOp;
use log::trace;
use parking_lot::Mutex;

use crate::{
    error::{ProverError, ProverResult},
    formula::{Formula, Term},
    prover::{GroupId, InterpolatingProver, TheoremProver},
    shutdown::ShutdownNotifier,
    variable::Symbol,
};

type Model = HashMap<Symbol, i64>;

/// Largest projection enumerated while building an interpolant.
const PROJECTION_LIMIT: usize = 8192;
/// Largest projection rendered as a disjunction of points.
const DISJUNCTION_LIMIT: usize = 64;

/// Enumeration prover over `[lower, upper]`.
///
/// Search assigns symbols in order, propagates top-level equalities whose
/// other side is already known and prunes with three-valued evaluation.
/// Interpolants are projections of `A` onto the shared symbols, rendered as
/// per-symbol intervals whenever possible.
#[derive(Debug)]
pub struct BoundedProver {
    lower: i64,
    upper: i64,
    step_budget: Option<u64>,
    shutdown: Option<ShutdownNotifier>,
    assertions: Vec<Formula>,
    frames: Vec<usize>,
    groups: Vec<Formula>,
    queries: u64,
}

impl Default for BoundedProver {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedProver {
    pub const DEFAULT_BOUND: i64 = 32;
    pub const DEFAULT_STEP_BUDGET: u64 = 2_000_000;

    pub fn new() -> Self {
        Self::with_bounds(-Self::DEFAULT_BOUND, Self::DEFAULT_BOUND)
    }

    pub fn with_bounds(lower: i64, upper: i64) -> Self {
        assert!(lower <= upper, "empty domain [{lower}, {upper}]");
        Self {
            lower,
            upper,
            step_budget: Some(Self::DEFAULT_STEP_BUDGET),
            shutdown: None,
            assertions: Vec::new(),
            frames: Vec::new(),
            groups: Vec::new(),
            queries: 0,
        }
    }

    /// Maximum number of search nodes per query; `None` for no limit.
    pub fn with_step_budget(mut self, budget: Option<u64>) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn with_shutdown(mut self, notifier: ShutdownNotifier) -> Self {
        self.shutdown = Some(notifier);
        self
    }

    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Number of satisfiability and interpolation queries answered so far.
    pub fn queries(&self) -> u64 {
        self.queries
    }

    fn search<'f>(&self, formula: &'f Formula, first: &[Symbol]) -> Search<'f, '_> {
        let mut order: Vec<Symbol> = first.to_vec();
        let rest = formula.symbols();
        order.extend(rest.into_iter().filter(|symbol| !first.contains(symbol)));

        let mut values = vec![0];
        for magnitude in 1..=self.upper.max(-self.lower) {
            for value in [magnitude, -magnitude] {
                if (self.lower..=self.upper).contains(&value) {
                    values.push(value);
                }
            }
        }
        values.retain(|value| (self.lower..=self.upper).contains(value));

        Search {
            conjuncts: formula.conjuncts(),
            order,
            values,
            lower: self.lower,
            upper: self.upper,
            budget: self.step_budget,
            steps: 0,
            shutdown: self.shutdown.as_ref(),
        }
    }

    fn solve(&mut self, formula: &Formula) -> ProverResult<Option<Model>> {
        self.queries += 1;
        let mut search = self.search(formula, &[]);
        let mut model = Model::new();
        let sat = search.run(&mut model)?;
        trace!("Bounded search answered {} after {} step(s)", if sat { "sat" } else { "unsat" }, search.steps);
        Ok(sat.then_some(model))
    }

    fn conjunction(&self, groups: &[GroupId]) -> ProverResult<Formula> {
        groups
            .iter()
            .map(|group| {
                self.groups
                    .get(group.0 as usize)
                    .cloned()
                    .ok_or_else(|| ProverError::Unsupported(format!("unknown group {}", group.0)))
            })
            .collect::<ProverResult<Vec<_>>>()
            .map(Formula::and)
    }

    /// `symbol ∈ [low, high]`, dropping bounds that coincide with the domain.
    fn interval(&self, symbol: &Symbol, low: i64, high: i64) -> Formula {
        let term = || Term::var(symbol.clone());
        match (low == self.lower, high == self.upper) {
            (true, true) => Formula::True,
            _ if low == high => Formula::equal(term(), low),
            (true, false) => Formula::compare(CmpOp::Le, term(), high),
            (false, true) => Formula::compare(CmpOp::Ge, term(), low),
            (false, false) => Formula::and([
                Formula::compare(CmpOp::Ge, term(), low),
                Formula::compare(CmpOp::Le, term(), high),
            ]),
        }
    }

    /// Disjunction of maximal runs of consecutive values.
    fn value_set(&self, symbol: &Symbol, values: &BTreeSet<i64>) -> Formula {
        let mut runs: Vec<(i64, i64)> = Vec::new();
        for &value in values {
            match runs.last_mut() {
                Some((_, high)) if *high + 1 == value => *high = value,
                _ => runs.push((value, value)),
            }
        }
        Formula::or(runs.into_iter().map(|(low, high)| self.interval(symbol, low, high)))
    }
}

impl TheoremProver for BoundedProver {
    fn push_context(&mut self) {
        self.frames.push(self.assertions.len());
    }

    fn pop_context(&mut self) {
        if let Some(len) = self.frames.pop() {
            self.assertions.truncate(len);
        }
    }

    fn assert_formula(&mut self, formula: &Formula) -> ProverResult<()> {
        self.assertions.push(formula.clone());
        Ok(())
    }

    fn check_sat(&mut self) -> ProverResult<bool> {
        let formula = Formula::and(self.assertions.iter().cloned());
        Ok(self.solve(&formula)?.is_some())
    }
}

impl InterpolatingProver for BoundedProver {
    fn add_group(&mut self, formula: &Formula) -> ProverResult<GroupId> {
        self.groups.push(formula.clone());
        Ok(GroupId(self.groups.len() as u32 - 1))
    }

    fn check_sat(&mut self) -> ProverResult<bool> {
        let formula = Formula::and(self.groups.iter().cloned());
        Ok(self.solve(&formula)?.is_some())
    }

    fn get_interpolant(&mut self, group_a: &[GroupId], group_b: &[GroupId]) -> ProverResult<Formula> {
        let a = self.conjunction(group_a)?;
        let b = self.conjunction(group_b)?;

        if self.solve(&a)?.is_none() {
            return Ok(Formula::False);
        }
        if self.solve(&Formula::and([a.clone(), b.clone()]))?.is_some() {
            return Err(ProverError::Satisfiable);
        }

        let b_symbols = b.symbols();
        let shared: Vec<Symbol> = a.symbols().into_iter().filter(|s| b_symbols.contains(s)).collect();
        if shared.is_empty() {
            return Ok(Formula::True);
        }

        self.queries += 1;
        let mut search = self.search(&a, &shared);
        let mut tuples = Vec::new();
        if !search.project(&mut Model::new(), &shared, &mut tuples)? {
            return Err(ProverError::InterpolationUnavailable(format!(
                "projection onto {} symbol(s) exceeds {PROJECTION_LIMIT} points",
                shared.len()
            )));
        }

        let columns: Vec<BTreeSet<i64>> = (0..shared.len())
            .map(|i| tuples.iter().map(|tuple: &Vec<i64>| tuple[i]).collect())
            .collect();

        let hull = Formula::and(shared.iter().zip(&columns).map(|(symbol, values)| {
            let (low, high) = (values.first().copied(), values.last().copied());
            match (low, high) {
                (Some(low), Some(high)) => self.interval(symbol, low, high),
                _ => Formula::False,
            }
        }));
        if self.solve(&Formula::and([hull.clone(), b.clone()]))?.is_none() {
            return Ok(hull);
        }

        let product = columns.iter().try_fold(1usize, |acc, values| acc.checked_mul(values.len()));
        if product == Some(tuples.len()) {
            return Ok(Formula::and(
                shared.iter().zip(&columns).map(|(symbol, values)| self.value_set(symbol, values)),
            ));
        }

        if tuples.len() <= DISJUNCTION_LIMIT {
            return Ok(Formula::or(tuples.iter().map(|tuple| {
                Formula::and(
                    shared
                        .iter()
                        .zip(tuple)
                        .map(|(symbol, value)| Formula::equal(Term::var(symbol.clone()), *value)),
                )
            })));
        }

        Err(ProverError::InterpolationUnavailable(format!(
            "projection of {} point(s) has no compact form",
            tuples.len()
        )))
    }

    fn reset(&mut self) {
        self.groups.clear();
    }
}

struct Search<'f, 'p> {
    conjuncts: &'f [Formula],
    order: Vec<Symbol>,
    values: Vec<i64>,
    lower: i64,
    upper: i64,
    budget: Option<u64>,
    steps: u64,
    shutdown: Option<&'p ShutdownNotifier>,
}

impl Search<'_, '_> {
    fn tick(&mut self) -> ProverResult<()> {
        self.steps += 1;
        if let Some(budget) = self.budget
            && self.steps > budget
        {
            return Err(ProverError::ResourceExhausted { steps: self.steps });
        }
        if let Some(notifier) = self.shutdown {
            notifier.check()?;
        }
        Ok(())
    }

    /// Three-valued value of the conjunction.
    fn status(&self, model: &Model) -> Option<bool> {
        let lookup = |symbol: &Symbol| model.get(symbol).copied();
        let mut result = Some(true);
        for conjunct in self.conjuncts {
            match conjunct.eval(&lookup) {
                Some(false) => return Some(false),
                Some(true) => {}
                None => result = None,
            }
        }
        result
    }

    /// Assign symbols forced by top-level equalities. Returns the assigned
    /// symbols, or `None` (with the model restored) on a conflict.
    fn propagate(&self, model: &mut Model) -> Option<Vec<Symbol>> {
        let mut trail = Vec::new();
        loop {
            let mut changed = false;
            for conjunct in self.conjuncts {
                let Formula::Cmp(CmpOp::Eq, lhs, rhs) = conjunct else {
                    continue;
                };
                for (target, source) in [(lhs, rhs), (rhs, lhs)] {
                    let Term::Var(symbol) = target else {
                        continue;
                    };
                    if model.contains_key(symbol) {
                        continue;
                    }
                    let Some(value) = source.eval(&|s: &Symbol| model.get(s).copied()) else {
                        continue;
                    };
                    match i64::try_from(value) {
                        Ok(value) if (self.lower..=self.upper).contains(&value) => {
                            model.insert(symbol.clone(), value);
                            trail.push(symbol.clone());
                            changed = true;
                        }
                        _ => {
                            for symbol in trail {
                                model.remove(&symbol);
                            }
                            return None;
                        }
                    }
                }
            }
            if !changed {
                return Some(trail);
            }
        }
    }

    fn undo(model: &mut Model, trail: Vec<Symbol>) {
        for symbol in trail {
            model.remove(&symbol);
        }
    }

    /// Depth-first search for a model. On success the model is left in place.
    fn run(&mut self, model: &mut Model) -> ProverResult<bool> {
        self.tick()?;
        let Some(trail) = self.propagate(model) else {
            return Ok(false);
        };
        match self.status(model) {
            Some(true) => return Ok(true),
            Some(false) => {
                Self::undo(model, trail);
                return Ok(false);
            }
            None => {}
        }

        let Some(next) = self.order.iter().find(|symbol| !model.contains_key(*symbol)).cloned() else {
            // Every symbol is assigned but evaluation overflowed.
            Self::undo(model, trail);
            return Ok(false);
        };
        for index in 0..self.values.len() {
            model.insert(next.clone(), self.values[index]);
            if self.run(model)? {
                return Ok(true);
            }
            model.remove(&next);
        }
        Self::undo(model, trail);
        Ok(false)
    }

    /// Collect every assignment of `shared` that extends to a model. Returns
    /// `false` once more than [`PROJECTION_LIMIT`] points were found.
    fn project(&mut self, model: &mut Model, shared: &[Symbol], out: &mut Vec<Vec<i64>>) -> ProverResult<bool> {
        self.tick()?;
        let Some(trail) = self.propagate(model) else {
            return Ok(true);
        };
        if self.status(model) == Some(false) {
            Self::undo(model, trail);
            return Ok(true);
        }

        let mut complete = true;
        match shared.iter().find(|symbol| !model.contains_key(*symbol)).cloned() {
            None => {
                let mut scratch = model.clone();
                if self.run(&mut scratch)? {
                    out.push(shared.iter().map(|symbol| model[symbol]).collect());
                    complete = out.len() <= PROJECTION_LIMIT;
                }
            }
            Some(next) => {
                for index in 0..self.values.len() {
                    model.insert(next.clone(), self.values[index]);
                    complete = self.project(model, shared, out)?;
                    model.remove(&next);
                    if !complete {
                        break;
                    }
                }
            }
        }
        Self::undo(model, trail);
        Ok(complete)
    }
}
