//! Symbolic execution of CFA edges into path formulas.
//!
//! [`PathFormulaManager::extend`] computes the strongest postcondition of a
//! single edge in SSA form: reads use the current index of a variable, writes
//! allocate a fresh one. The operation is pure, which makes it safe to
//! memoize with a [`BlockFormulaCache`].
use std::collections::HashMap;

use cpacfa::{BinaryOp, CfaEdge, Cond, EdgeId, EdgeKind, Expr, Location};
use log::trace;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    error::{FormulaError, FormulaResult},
    formula::{Formula, Term},
    path_formula::PathFormula,
    ssa::SsaMap,
    variable::Symbol,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PathFormulaManager;

impl PathFormulaManager {
    pub fn new() -> Self {
        Self
    }

    /// Program expression over the indices of `ssa`.
    pub fn make_term(&self, expr: &Expr, ssa: &SsaMap) -> Term {
        match expr {
            Expr::Lit(value) => Term::constant(*value),
            Expr::Var(var) => Term::var(Symbol::indexed(var.clone(), ssa.get(var))),
            Expr::Neg(inner) => self.make_term(inner, ssa).neg(),
            Expr::Binary(op, lhs, rhs) => {
                let (lhs, rhs) = (self.make_term(lhs, ssa), self.make_term(rhs, ssa));
                match op {
                    BinaryOp::Add => lhs.add(rhs),
                    BinaryOp::Sub => lhs.sub(rhs),
                    BinaryOp::Mul => lhs.mul(rhs),
                }
            }
        }
    }

    /// Program condition over the indices of `ssa`.
    pub fn make_condition(&self, cond: &Cond, ssa: &SsaMap) -> Formula {
        match cond {
            Cond::Lit(value) => Formula::bool(*value),
            Cond::Cmp(op, lhs, rhs) => Formula::compare(*op, self.make_term(lhs, ssa), self.make_term(rhs, ssa)),
            Cond::Not(inner) => self.make_condition(inner, ssa).negate(),
            Cond::And(lhs, rhs) => self.make_condition(lhs, ssa) & self.make_condition(rhs, ssa),
            Cond::Or(lhs, rhs) => self.make_condition(lhs, ssa) | self.make_condition(rhs, ssa),
        }
    }

    /// Strongest postcondition of `edge` applied to `pf`.
    pub fn extend(&self, pf: &PathFormula, edge: CfaEdge<'_>) -> FormulaResult<PathFormula> {
        let ssa = pf.ssa();
        let (constraint, ssa) = match edge.kind {
            EdgeKind::Assume { cond, branch } => {
                let condition = self.make_condition(cond, ssa);
                let condition = if *branch { condition } else { condition.negate() };
                (condition, ssa.clone())
            }
            EdgeKind::Assignment { lhs, rhs } => {
                let value = self.make_term(rhs, ssa);
                let (ssa, index) = ssa.fresh(lhs);
                (Formula::equal(Symbol::indexed(lhs.clone(), index), value), ssa)
            }
            EdgeKind::Declaration { var, init } => {
                let value = init.as_ref().map(|init| self.make_term(init, ssa));
                let (ssa, index) = ssa.fresh(var);
                let constraint = match value {
                    Some(value) => Formula::equal(Symbol::indexed(var.clone(), index), value),
                    None => Formula::True,
                };
                (constraint, ssa)
            }
            EdgeKind::Call { bindings, .. } => {
                // Actuals are read in the caller before any formal is written.
                let actuals: Vec<Term> = bindings.iter().map(|(_, actual)| self.make_term(actual, ssa)).collect();
                let mut next = ssa.clone();
                let mut equalities = Vec::with_capacity(bindings.len());
                for ((formal, _), actual) in bindings.iter().zip(actuals) {
                    let (updated, index) = next.fresh(formal);
                    equalities.push(Formula::equal(Symbol::indexed(formal.clone(), index), actual));
                    next = updated;
                }
                (Formula::and(equalities), next)
            }
            EdgeKind::Return { value, result } => match (value, result) {
                (Some(value), Some(result)) => {
                    let value = self.make_term(value, ssa);
                    let (ssa, index) = ssa.fresh(result);
                    (Formula::equal(Symbol::indexed(result.clone(), index), value), ssa)
                }
                (None, Some(_)) => {
                    return Err(FormulaError::UndefinedEdgeSemantics {
                        edge: edge.to_string(),
                        reason: "the returned value is stored but the function returns nothing",
                    });
                }
                (_, None) => (Formula::True, ssa.clone()),
            },
            EdgeKind::Blank => return Ok(pf.clone()),
        };

        Ok(PathFormula::new(pf.formula().clone() & constraint, ssa))
    }
}

type CacheKey = (Location, Location, Location, EdgeId);

/// Memoizes [`PathFormulaManager::extend`] per `(abstraction location,
/// predecessor, successor)`.
///
/// Every entry also records the input path formula it was computed from and a
/// hit requires an identical input, so two different paths reaching the same
/// edge inside one block never share a result. The cache lives as long as one
/// analysis run.
#[derive(Debug, Default)]
pub struct BlockFormulaCache {
    entries: Mutex<HashMap<CacheKey, SmallVec<[(PathFormula, PathFormula); 1]>>>,
    hits: Mutex<u64>,
}

impl BlockFormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(
        &self,
        manager: &PathFormulaManager,
        abstraction_location: Location,
        pf: &PathFormula,
        edge: CfaEdge<'_>,
    ) -> FormulaResult<PathFormula> {
        let key = (abstraction_location, edge.predecessor, edge.successor, edge.id);
        if let Some(slot) = self.entries.lock().get(&key)
            && let Some((_, output)) = slot.iter().find(|(input, _)| input == pf)
        {
            *self.hits.lock() += 1;
            trace!("Path formula cache hit for {edge} in block of {abstraction_location}");
            return Ok(output.clone());
        }

        let output = manager.extend(pf, edge)?;
        self.entries
            .lock()
            .entry(key)
            .or_default()
            .push((pf.clone(), output.clone()));
        Ok(output)
    }

    pub fn hits(&self) -> u64 {
        *self.hits.lock()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().map(SmallVec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use cpacfa::{CfaBuilder, CmpOp, EdgeType, Var};

    use super::*;

    fn sym(name: &str, index: u32) -> Term {
        Term::var(Symbol::indexed(Var::new(name), index))
    }

    #[test]
    fn assignments_allocate_fresh_indices() {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        builder
            .define(main, |f| {
                f.assign("x", 1);
                f.assign("x", Expr::var("x") + 1);
                f.assume(Expr::var("x").gt(1));
            })
            .unwrap();
        let cfa = builder.build(main).unwrap();

        let manager = PathFormulaManager::new();
        let mut pf = PathFormula::identity();
        let mut location = cfa.entry();
        for _ in 0..3 {
            let edge = cfa.leaving_edges(location)[0];
            pf = manager.extend(&pf, edge).unwrap();
            location = edge.successor;
        }

        assert_eq!(pf.ssa().get(&Var::new("x")), 2);
        assert_eq!(
            pf.formula(),
            &Formula::and([
                Formula::equal(sym("x", 1), 1),
                Formula::equal(sym("x", 2), sym("x", 1).add(Term::constant(1))),
                Formula::compare(CmpOp::Gt, sym("x", 2), 1),
            ])
        );
    }

    #[test]
    fn return_without_value_is_undefined() {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        builder.define(main, |f| {
            let from = f.cursor();
            let to = f.new_location();
            f.add_edge(
                from,
                to,
                EdgeKind::Return {
                    value: None,
                    result: Some(Var::new("r")),
                },
            );
            f.set_cursor(to);
        })
        .unwrap();
        // Return edges must leave an exit location, so the undefined edge is
        // exercised directly below.
        let err = builder.build(main).unwrap_err();
        assert!(err.is_misplaced_return());

        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        let callee = builder.declare("callee", &[]).unwrap();
        builder.define(callee, |_| {}).unwrap();
        builder
            .define(main, |f| {
                f.call(callee, vec![], Some(Var::new("r")));
            })
            .unwrap();
        let cfa = builder.build(main).unwrap();
        let exit = cfa.function(callee).exit;
        let edge = cfa.leaving_edges(exit)[0];
        assert_eq!(edge.kind.edge_type(), EdgeType::Return);

        let undefined = EdgeKind::Return {
            value: None,
            result: Some(Var::new("r")),
        };
        let edge = CfaEdge { kind: &undefined, ..edge };
        let err = PathFormulaManager::new().extend(&PathFormula::identity(), edge).unwrap_err();
        assert!(err.is_undefined_edge_semantics());
    }

    #[test]
    fn call_bindings_read_actuals_before_writing_formals() {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        let swap = builder.declare("swap", &["a", "b"]).unwrap();
        builder.define(swap, |_| {}).unwrap();
        builder
            .define(main, |f| {
                f.call(swap, vec![Expr::var("b"), Expr::var("a")], None);
            })
            .unwrap();
        let cfa = builder.build(main).unwrap();

        let call = cfa.leaving_edges(cfa.entry())[0];
        let pf = PathFormulaManager::new().extend(&PathFormula::identity(), call).unwrap();
        assert_eq!(
            pf.formula(),
            &Formula::and([Formula::equal(sym("a", 1), sym("b", 0)), Formula::equal(sym("b", 1), sym("a", 0))])
        );
    }

    #[test]
    fn cache_distinguishes_inputs_on_diamonds() {
        let mut builder = CfaBuilder::new();
        let main = builder.declare("main", &[]).unwrap();
        builder
            .define(main, |f| {
                f.if_then_else(
                    Expr::var("c").gt(0),
                    |f| {
                        f.assign("x", 1);
                    },
                    |f| {
                        f.assign("x", 2);
                    },
                );
                f.assign("y", Expr::var("x"));
            })
            .unwrap();
        let cfa = builder.build(main).unwrap();
        let manager = PathFormulaManager::new();
        let cache = BlockFormulaCache::new();
        let head = cfa.entry();

        let mut results = Vec::new();
        for branch in cfa.leaving_edges(head) {
            let mut pf = cache.extend(&manager, head, &PathFormula::identity(), branch).unwrap();
            let mut location = branch.successor;
            while let Some(edge) = cfa.leaving_edges(location).first().copied() {
                pf = cache.extend(&manager, head, &pf, edge).unwrap();
                location = edge.successor;
            }
            results.push(pf);
        }

        assert_ne!(results[0], results[1]);
        for pf in &results {
            assert_eq!(pf.formula().atoms().len(), 3);
            assert_eq!(pf.ssa().get(&Var::new("y")), 1);
        }
        assert_eq!(cache.hits(), 0);

        // Replaying the first branch hits on every edge.
        let first = cfa.leaving_edges(head)[0];
        let pf = cache.extend(&manager, head, &PathFormula::identity(), first).unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(pf, manager.extend(&PathFormula::identity(), first).unwrap());
    }
}
