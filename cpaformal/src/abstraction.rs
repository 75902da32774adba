//! Boolean predicate abstraction.
//!
//! An [`AbstractFormula`] is a canonical BDD whose variables are predicates.
//! The [`AbstractionManager`] owns the BDD nodes, the predicate registry and a
//! handle on the theorem prover used to compute abstractions:
//!
//! * the abstraction of `prior ∧ pf` with respect to a predicate set is the
//!   disjunction of all predicate cubes consistent with it. Cubes are
//!   enumerated by case splitting in predicate order with the prover's
//!   context stack, so inconsistent prefixes are pruned early;
//! * `prior` is a previous abstraction, instantiated at the SSA indices of the
//!   beginning of the block (index 0), while predicates are instantiated at the
//!   indices reached at the end of `pf`.
//!
//! Predicates are normalized, unindexed comparison atoms. Interning makes two
//! syntactically equal atoms share one BDD variable.
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::{
    bdd::{BddManager, BddRef},
    error::{FormulaError, FormulaResult, ProverResult},
    formula::Formula,
    path_formula::PathFormula,
    prover::{SharedProver, TheoremProver},
    ssa::SsaMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PredicateId(u32);

impl PredicateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Boolean combination of predicates, represented by a canonical BDD.
///
/// Equality of two abstract formulas created by the same manager is Boolean
/// equivalence over the predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbstractFormula(BddRef);

impl AbstractFormula {
    pub const TRUE: AbstractFormula = AbstractFormula(BddRef::TRUE);
    pub const FALSE: AbstractFormula = AbstractFormula(BddRef::FALSE);

    pub fn is_true(self) -> bool {
        self.0 == BddRef::TRUE
    }

    pub fn is_false(self) -> bool {
        self.0 == BddRef::FALSE
    }
}

#[derive(Debug, Default)]
struct PredicateRegistry {
    atoms: Vec<Formula>,
    index: HashMap<Formula, PredicateId>,
}

pub struct AbstractionManager {
    bdd: Mutex<BddManager>,
    registry: RwLock<PredicateRegistry>,
    prover: SharedProver,
    semantic_entailment: bool,
}

impl AbstractionManager {
    /// With `semantic_entailment`, entailment checks that fail on the BDDs are
    /// retried on the concrete formulas with the prover, which accounts for
    /// theory relations between predicates (e.g. `x < 0` entails `x < 1`).
    pub fn new(prover: SharedProver, semantic_entailment: bool) -> Self {
        Self {
            bdd: Mutex::new(BddManager::new()),
            registry: RwLock::new(PredicateRegistry::default()),
            prover,
            semantic_entailment,
        }
    }

    pub fn prover(&self) -> &SharedProver {
        &self.prover
    }

    /// Intern the normalized, unindexed form of a comparison atom.
    pub fn make_predicate(&self, atom: &Formula) -> FormulaResult<PredicateId> {
        let normalized = atom.unindex().normalize_atom().ok_or_else(|| FormulaError::NotAnAtom {
            formula: atom.to_string(),
        })?;

        if let Some(id) = self.registry.read().index.get(&normalized) {
            return Ok(*id);
        }

        let mut registry = self.registry.write();
        if let Some(id) = registry.index.get(&normalized) {
            return Ok(*id);
        }
        let id = PredicateId(registry.atoms.len() as u32);
        trace!("New predicate {id}: {normalized}");
        registry.atoms.push(normalized.clone());
        registry.index.insert(normalized, id);
        Ok(id)
    }

    /// Predicates for every atom of an interpolant, in order of occurrence.
    pub fn extract_predicates(&self, interpolant: &Formula) -> Vec<PredicateId> {
        let mut ids = Vec::new();
        for atom in interpolant.atoms() {
            if let Ok(id) = self.make_predicate(&atom)
                && !ids.contains(&id)
            {
                ids.push(id);
            }
        }
        ids
    }

    /// Unindexed atom of a predicate.
    pub fn predicate(&self, id: PredicateId) -> Formula {
        self.registry.read().atoms[id.index()].clone()
    }

    pub fn num_predicates(&self) -> usize {
        self.registry.read().atoms.len()
    }

    /// Abstract formula made of the single predicate `id`.
    pub fn predicate_formula(&self, id: PredicateId) -> AbstractFormula {
        AbstractFormula(self.bdd.lock().var(id.0))
    }

    pub fn and(&self, lhs: AbstractFormula, rhs: AbstractFormula) -> AbstractFormula {
        AbstractFormula(self.bdd.lock().and(lhs.0, rhs.0))
    }

    pub fn or(&self, lhs: AbstractFormula, rhs: AbstractFormula) -> AbstractFormula {
        AbstractFormula(self.bdd.lock().or(lhs.0, rhs.0))
    }

    pub fn not(&self, formula: AbstractFormula) -> AbstractFormula {
        AbstractFormula(self.bdd.lock().not(formula.0))
    }

    /// Evaluate under a truth assignment of the predicates.
    pub fn eval(&self, formula: AbstractFormula, valuation: impl Fn(PredicateId) -> bool) -> bool {
        self.bdd.lock().eval(formula.0, |var| valuation(PredicateId(var)))
    }

    /// Concrete formula of `formula`, with predicates instantiated at `ssa`.
    pub fn to_concrete(&self, formula: AbstractFormula, ssa: &SsaMap) -> Formula {
        fn build(
            f: BddRef,
            bdd: &BddManager,
            atoms: &[Formula],
            ssa: &SsaMap,
            memo: &mut HashMap<BddRef, Formula>,
        ) -> Formula {
            let Some((var, low, high)) = bdd.node(f) else {
                return Formula::bool(f == BddRef::TRUE);
            };
            if let Some(done) = memo.get(&f) {
                return done.clone();
            }

            let atom = atoms[var as usize].instantiate(ssa);
            let result = match (low, high) {
                (BddRef::FALSE, BddRef::TRUE) => atom,
                (BddRef::TRUE, BddRef::FALSE) => atom.negate(),
                _ => {
                    let high = build(high, bdd, atoms, ssa, memo);
                    let low = build(low, bdd, atoms, ssa, memo);
                    Formula::or([Formula::and([atom.clone(), high]), Formula::and([atom.negate(), low])])
                }
            };
            memo.insert(f, result.clone());
            result
        }

        let bdd = self.bdd.lock();
        let registry = self.registry.read();
        build(formula.0, &bdd, &registry.atoms, ssa, &mut HashMap::new())
    }

    /// Boolean abstraction of `prior ∧ pf` over `predicates`.
    ///
    /// Returns [`AbstractFormula::FALSE`] when the conjunction is
    /// unsatisfiable. Prover failures are propagated.
    pub fn abstract_formula(
        &self,
        prior: AbstractFormula,
        pf: &PathFormula,
        predicates: &BTreeSet<PredicateId>,
    ) -> ProverResult<AbstractFormula> {
        let base = Formula::and([self.to_concrete(prior, &SsaMap::new()), pf.formula().clone()]);
        let atoms: Vec<(PredicateId, Formula)> = {
            let registry = self.registry.read();
            predicates
                .iter()
                .map(|id| (*id, registry.atoms[id.index()].instantiate(pf.ssa())))
                .collect()
        };

        let mut prover = self.prover.lock();
        prover.push_context();
        let result = prover
            .assert_formula(&base)
            .and_then(|()| prover.check_sat())
            .and_then(|sat| if sat { self.split(&mut *prover, &atoms) } else { Ok(BddRef::FALSE) });
        prover.pop_context();
        let result = AbstractFormula(result?);

        debug!(
            "Abstraction over {} predicate(s): {}",
            predicates.len(),
            if result.is_false() { "false".to_string() } else { format!("{result:?}") }
        );
        Ok(result)
    }

    fn split(&self, prover: &mut dyn TheoremProver, atoms: &[(PredicateId, Formula)]) -> ProverResult<BddRef> {
        let Some(((id, atom), rest)) = atoms.split_first() else {
            return Ok(BddRef::TRUE);
        };
        let high = self.branch(prover, atom, rest)?;
        let low = self.branch(prover, &atom.negate(), rest)?;
        Ok(self.bdd.lock().mk(id.0, low, high))
    }

    fn branch(
        &self,
        prover: &mut dyn TheoremProver,
        literal: &Formula,
        rest: &[(PredicateId, Formula)],
    ) -> ProverResult<BddRef> {
        prover.push_context();
        let result = prover.assert_formula(literal).and_then(|()| prover.check_sat()).and_then(|sat| {
            if sat {
                self.split(prover, rest)
            } else {
                Ok(BddRef::FALSE)
            }
        });
        prover.pop_context();
        result
    }

    /// Whether `lhs` entails `rhs`.
    pub fn entails(&self, lhs: AbstractFormula, rhs: AbstractFormula) -> ProverResult<bool> {
        if self.bdd.lock().implies(lhs.0, rhs.0) {
            return Ok(true);
        }
        if !self.semantic_entailment {
            return Ok(false);
        }

        let ssa = SsaMap::new();
        let (premise, conclusion) = (self.to_concrete(lhs, &ssa), self.to_concrete(rhs, &ssa));
        self.prover.lock().entails(&premise, &conclusion)
    }

    /// Whether `abstraction ∧ pf` is unsatisfiable.
    pub fn unsat(&self, abstraction: AbstractFormula, pf: &PathFormula) -> ProverResult<bool> {
        if abstraction.is_false() {
            return Ok(true);
        }
        let formula = Formula::and([self.to_concrete(abstraction, &SsaMap::new()), pf.formula().clone()]);
        Ok(!self.prover.lock().is_sat(&formula)?)
    }
}

impl fmt::Debug for AbstractionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractionManager")
            .field("predicates", &self.num_predicates())
            .field("bdd_nodes", &self.bdd.lock().num_nodes())
            .field("semantic_entailment", &self.semantic_entailment)
            .finish()
    }
}
