//! Quantifier-free formulas over linear (and non-linear) integer arithmetic.
//!
//! Formulas are kept in negation normal form: the constructors push negations
//! into comparisons, so a [`Formula`] is a tree of conjunctions and
//! disjunctions over comparison atoms. Constant atoms and neutral elements are
//! folded on construction.
use std::{
    collections::BTreeSet,
    ops::{BitAnd, BitOr, Not},
};

use cpacfa::CmpOp;
use strum::{EnumIs, EnumTryAs};

use crate::{ssa::SsaMap, variable::Symbol};

pub mod pretty;

/// Integer term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs)]
pub enum Term {
    Const(i64),
    Var(Symbol),
    Neg(Box<Term>),
    Add(Box<Term>, Box<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
}

impl Term {
    pub fn var(symbol: Symbol) -> Self {
        Term::Var(symbol)
    }

    pub fn constant(value: i64) -> Self {
        Term::Const(value)
    }

    pub fn neg(self) -> Self {
        match self {
            Term::Const(value) if value != i64::MIN => Term::Const(-value),
            Term::Neg(inner) => *inner,
            other => Term::Neg(Box::new(other)),
        }
    }

    pub fn add(self, rhs: Term) -> Self {
        match (self, rhs) {
            (Term::Const(a), Term::Const(b)) if a.checked_add(b).is_some() => Term::Const(a + b),
            (lhs, Term::Const(0)) => lhs,
            (Term::Const(0), rhs) => rhs,
            (lhs, rhs) => Term::Add(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn sub(self, rhs: Term) -> Self {
        match (self, rhs) {
            (Term::Const(a), Term::Const(b)) if a.checked_sub(b).is_some() => Term::Const(a - b),
            (lhs, Term::Const(0)) => lhs,
            (lhs, rhs) => Term::Sub(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn mul(self, rhs: Term) -> Self {
        match (self, rhs) {
            (Term::Const(a), Term::Const(b)) if a.checked_mul(b).is_some() => Term::Const(a * b),
            (lhs, Term::Const(1)) => lhs,
            (Term::Const(1), rhs) => rhs,
            (lhs, rhs) => Term::Mul(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Evaluate under a partial model; `None` if a symbol is unassigned or the
    /// computation overflows.
    pub fn eval(&self, model: &impl Fn(&Symbol) -> Option<i64>) -> Option<i128> {
        match self {
            Term::Const(value) => Some(*value as i128),
            Term::Var(symbol) => model(symbol).map(i128::from),
            Term::Neg(inner) => inner.eval(model)?.checked_neg(),
            Term::Add(lhs, rhs) => lhs.eval(model)?.checked_add(rhs.eval(model)?),
            Term::Sub(lhs, rhs) => lhs.eval(model)?.checked_sub(rhs.eval(model)?),
            Term::Mul(lhs, rhs) => lhs.eval(model)?.checked_mul(rhs.eval(model)?),
        }
    }

    pub fn map_symbols(&self, f: &impl Fn(&Symbol) -> Symbol) -> Term {
        match self {
            Term::Const(value) => Term::Const(*value),
            Term::Var(symbol) => Term::Var(f(symbol)),
            Term::Neg(inner) => Term::Neg(Box::new(inner.map_symbols(f))),
            Term::Add(lhs, rhs) => Term::Add(Box::new(lhs.map_symbols(f)), Box::new(rhs.map_symbols(f))),
            Term::Sub(lhs, rhs) => Term::Sub(Box::new(lhs.map_symbols(f)), Box::new(rhs.map_symbols(f))),
            Term::Mul(lhs, rhs) => Term::Mul(Box::new(lhs.map_symbols(f)), Box::new(rhs.map_symbols(f))),
        }
    }

    pub fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Term::Const(_) => {}
            Term::Var(symbol) => {
                out.insert(symbol.clone());
            }
            Term::Neg(inner) => inner.collect_symbols(out),
            Term::Add(lhs, rhs) | Term::Sub(lhs, rhs) | Term::Mul(lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
        }
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Const(value)
    }
}

impl From<i32> for Term {
    fn from(value: i32) -> Self {
        Term::Const(value as i64)
    }
}

impl From<Symbol> for Term {
    fn from(value: Symbol) -> Self {
        Term::Var(value)
    }
}

/// Quantifier-free formula in negation normal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs, EnumTryAs)]
pub enum Formula {
    True,
    False,
    Cmp(CmpOp, Term, Term),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn bool(value: bool) -> Self {
        if value { Formula::True } else { Formula::False }
    }

    /// Comparison atom, folded when both sides are constants.
    pub fn compare(op: CmpOp, lhs: impl Into<Term>, rhs: impl Into<Term>) -> Self {
        match (lhs.into(), rhs.into()) {
            (Term::Const(a), Term::Const(b)) => Formula::bool(op.holds(a, b)),
            (lhs, rhs) => Formula::Cmp(op, lhs, rhs),
        }
    }

    pub fn equal(lhs: impl Into<Term>, rhs: impl Into<Term>) -> Self {
        Self::compare(CmpOp::Eq, lhs, rhs)
    }

    /// Flattened conjunction. Duplicates are dropped, `false` absorbs.
    pub fn and(parts: impl IntoIterator<Item = Formula>) -> Self {
        let mut conjuncts = Vec::new();
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => {
                    for f in inner {
                        if !conjuncts.contains(&f) {
                            conjuncts.push(f);
                        }
                    }
                }
                f => {
                    if !conjuncts.contains(&f) {
                        conjuncts.push(f);
                    }
                }
            }
        }
        match conjuncts.len() {
            0 => Formula::True,
            1 => conjuncts.pop().unwrap_or(Formula::True),
            _ => Formula::And(conjuncts),
        }
    }

    /// Flattened disjunction. Duplicates are dropped, `true` absorbs.
    pub fn or(parts: impl IntoIterator<Item = Formula>) -> Self {
        let mut disjuncts = Vec::new();
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => {
                    for f in inner {
                        if !disjuncts.contains(&f) {
                            disjuncts.push(f);
                        }
                    }
                }
                f => {
                    if !disjuncts.contains(&f) {
                        disjuncts.push(f);
                    }
                }
            }
        }
        match disjuncts.len() {
            0 => Formula::False,
            1 => disjuncts.pop().unwrap_or(Formula::False),
            _ => Formula::Or(disjuncts),
        }
    }

    /// Negation, pushed down to the atoms.
    pub fn negate(&self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Cmp(op, lhs, rhs) => Formula::Cmp(op.negate(), lhs.clone(), rhs.clone()),
            Formula::And(parts) => Formula::or(parts.iter().map(Formula::negate)),
            Formula::Or(parts) => Formula::and(parts.iter().map(Formula::negate)),
        }
    }

    pub fn implies(&self, conclusion: &Formula) -> Formula {
        Formula::or([self.negate(), conclusion.clone()])
    }

    /// Top-level conjuncts (the formula itself unless it is a conjunction).
    pub fn conjuncts(&self) -> &[Formula] {
        match self {
            Formula::And(parts) => parts,
            Formula::True => &[],
            other => std::slice::from_ref(other),
        }
    }

    pub fn map_symbols(&self, f: &impl Fn(&Symbol) -> Symbol) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Cmp(op, lhs, rhs) => Formula::Cmp(*op, lhs.map_symbols(f), rhs.map_symbols(f)),
            Formula::And(parts) => Formula::And(parts.iter().map(|p| p.map_symbols(f)).collect()),
            Formula::Or(parts) => Formula::Or(parts.iter().map(|p| p.map_symbols(f)).collect()),
        }
    }

    /// Attach the indices of `ssa` to every unindexed symbol.
    pub fn instantiate(&self, ssa: &SsaMap) -> Formula {
        self.map_symbols(&|symbol| match symbol.index {
            Some(_) => symbol.clone(),
            None => Symbol::indexed(symbol.var.clone(), ssa.get(&symbol.var)),
        })
    }

    /// Drop every SSA index.
    pub fn unindex(&self) -> Formula {
        self.map_symbols(&Symbol::without_index)
    }

    /// Distinct comparison atoms, in order of first occurrence.
    pub fn atoms(&self) -> Vec<Formula> {
        fn visit(formula: &Formula, out: &mut Vec<Formula>) {
            match formula {
                Formula::True | Formula::False => {}
                Formula::Cmp(..) => {
                    if !out.contains(formula) {
                        out.push(formula.clone());
                    }
                }
                Formula::And(parts) | Formula::Or(parts) => parts.iter().for_each(|p| visit(p, out)),
            }
        }

        let mut out = Vec::new();
        visit(self, &mut out);
        out
    }

    /// Canonical positive form of an atom: `!=` becomes `==` and `>`/`>=` are
    /// flipped to `<`/`<=`. Returns `None` for non-atoms.
    pub fn normalize_atom(&self) -> Option<Formula> {
        let Formula::Cmp(op, lhs, rhs) = self else {
            return None;
        };
        let (op, lhs, rhs) = match op {
            CmpOp::Ne => (CmpOp::Eq, lhs, rhs),
            CmpOp::Gt => (CmpOp::Lt, rhs, lhs),
            CmpOp::Ge => (CmpOp::Le, rhs, lhs),
            op => (*op, lhs, rhs),
        };
        Some(Formula::Cmp(op, lhs.clone(), rhs.clone()))
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    pub fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Cmp(_, lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Formula::And(parts) | Formula::Or(parts) => parts.iter().for_each(|p| p.collect_symbols(out)),
        }
    }

    /// Three-valued evaluation under a partial model.
    pub fn eval(&self, model: &impl Fn(&Symbol) -> Option<i64>) -> Option<bool> {
        match self {
            Formula::True => Some(true),
            Formula::False => Some(false),
            Formula::Cmp(op, lhs, rhs) => Some(op.holds(lhs.eval(model)?, rhs.eval(model)?)),
            Formula::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.eval(model) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                result
            }
            Formula::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.eval(model) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                result
            }
        }
    }
}

impl BitAnd for Formula {
    type Output = Formula;

    fn bitand(self, rhs: Formula) -> Formula {
        Formula::and([self, rhs])
    }
}

impl BitOr for Formula {
    type Output = Formula;

    fn bitor(self, rhs: Formula) -> Formula {
        Formula::or([self, rhs])
    }
}

impl Not for Formula {
    type Output = Formula;

    fn not(self) -> Formula {
        self.negate()
    }
}

impl Not for &Formula {
    type Output = Formula;

    fn not(self) -> Formula {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use cpacfa::Var;

    use super::*;

    fn sym(name: &str, index: u32) -> Term {
        Term::var(Symbol::indexed(Var::new(name), index))
    }

    #[test]
    fn constructors_fold_constants() {
        assert_eq!(Formula::compare(CmpOp::Lt, 1, 2), Formula::True);
        assert_eq!(Formula::and([Formula::True, Formula::equal(sym("x", 1), 0)]), Formula::equal(sym("x", 1), 0));
        assert_eq!(Formula::or([Formula::False, Formula::True]), Formula::True);
        assert_eq!(Term::constant(2).add(Term::constant(3)), Term::constant(5));
    }

    #[test]
    fn negation_reaches_atoms() {
        let f = Formula::compare(CmpOp::Lt, sym("x", 0), 3) & Formula::equal(sym("y", 1), sym("x", 0));
        let negated = !f;
        assert_eq!(
            negated,
            Formula::Or(vec![
                Formula::Cmp(CmpOp::Ge, sym("x", 0), Term::Const(3)),
                Formula::Cmp(CmpOp::Ne, sym("y", 1), sym("x", 0)),
            ])
        );
        assert_eq!(negated.atoms().len(), 2);
    }

    #[test]
    fn normalization_flips_to_less_than() {
        let atom = Formula::compare(CmpOp::Ge, sym("x", 2), 10);
        assert_eq!(
            atom.normalize_atom(),
            Some(Formula::Cmp(CmpOp::Le, Term::Const(10), sym("x", 2)))
        );
        let ne = Formula::compare(CmpOp::Ne, sym("x", 2), 10);
        assert_eq!(ne.normalize_atom(), Some(Formula::equal(sym("x", 2), 10)));
        assert_eq!(Formula::True.normalize_atom(), None);
    }

    #[test]
    fn instantiate_then_unindex_is_identity_on_program_formulas() {
        let x = Term::var(Symbol::unindexed(Var::new("x")));
        let f = Formula::compare(CmpOp::Gt, x, 0);
        let ssa = SsaMap::new().with(Var::new("x"), 4);
        let inst = f.instantiate(&ssa);
        assert_eq!(inst, Formula::compare(CmpOp::Gt, sym("x", 4), 0));
        assert_eq!(inst.unindex(), f);
    }

    #[test]
    fn partial_evaluation_is_three_valued() {
        let f = Formula::or([
            Formula::compare(CmpOp::Gt, sym("x", 0), 0),
            Formula::compare(CmpOp::Gt, sym("y", 0), 0),
        ]);
        let mut model = BTreeMap::new();
        model.insert(Symbol::indexed(Var::new("x"), 0), -1);
        assert_eq!(f.eval(&|s| model.get(s).copied()), None);
        model.insert(Symbol::indexed(Var::new("y"), 0), 1);
        assert_eq!(f.eval(&|s| model.get(s).copied()), Some(true));
    }
}
