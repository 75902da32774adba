//! RcDoc-based pretty-printer for terms and formulas.
//!
//! Conjunctions and disjunctions break one operand per line when they do not
//! fit the rendering width; nested connectives are parenthesized.
use std::fmt;

use pretty::{FmtWrite, RcDoc};

use super::{Formula, Term};

const WIDTH: usize = 100;

fn parens(doc: RcDoc<'static, ()>) -> RcDoc<'static, ()> {
    RcDoc::text("(").append(doc).append(RcDoc::text(")")).group()
}

fn binary(lhs: &Term, op: &'static str, rhs: &Term) -> RcDoc<'static, ()> {
    parens(
        term_doc(lhs)
            .append(RcDoc::space())
            .append(RcDoc::text(op))
            .append(RcDoc::space())
            .append(term_doc(rhs)),
    )
}

fn term_doc(term: &Term) -> RcDoc<'static, ()> {
    match term {
        Term::Const(value) => RcDoc::as_string(value),
        Term::Var(symbol) => RcDoc::as_string(symbol),
        Term::Neg(inner) => RcDoc::text("-").append(parens(term_doc(inner))),
        Term::Add(lhs, rhs) => binary(lhs, "+", rhs),
        Term::Sub(lhs, rhs) => binary(lhs, "-", rhs),
        Term::Mul(lhs, rhs) => binary(lhs, "*", rhs),
    }
}

fn connective(parts: &[Formula], op: &'static str) -> RcDoc<'static, ()> {
    let operands = parts.iter().map(|part| match part {
        Formula::And(_) | Formula::Or(_) => parens(formula_doc(part)),
        _ => formula_doc(part),
    });
    RcDoc::intersperse(operands, RcDoc::line().append(RcDoc::text(op)).append(RcDoc::space()))
        .nest(2)
        .group()
}

fn formula_doc(formula: &Formula) -> RcDoc<'static, ()> {
    match formula {
        Formula::True => RcDoc::text("true"),
        Formula::False => RcDoc::text("false"),
        Formula::Cmp(op, lhs, rhs) => term_doc(lhs)
            .append(RcDoc::space())
            .append(RcDoc::text(op.to_str()))
            .append(RcDoc::space())
            .append(term_doc(rhs))
            .group(),
        Formula::And(parts) => connective(parts, "&&"),
        Formula::Or(parts) => connective(parts, "||"),
    }
}

impl Formula {
    pub fn pretty_doc(&self) -> RcDoc<'static, ()> {
        formula_doc(self)
    }
}

impl Term {
    pub fn pretty_doc(&self) -> RcDoc<'static, ()> {
        term_doc(self)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w = FmtWrite::new(f);
        self.pretty_doc().render_raw(WIDTH, &mut w)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w = FmtWrite::new(f);
        self.pretty_doc().render_raw(WIDTH, &mut w)
    }
}

#[cfg(test)]
mod tests {
    use cpacfa::{CmpOp, Var};

    use super::*;
    use crate::variable::Symbol;

    #[test]
    fn nested_connectives_are_parenthesized() {
        let x = Term::var(Symbol::indexed(Var::new("x"), 1));
        let y = Term::var(Symbol::unindexed(Var::new("y")));
        let f = Formula::and([
            Formula::compare(CmpOp::Lt, x.clone().add(Term::constant(1)), y.clone()),
            Formula::or([Formula::equal(x, 0), Formula::equal(y, 2)]),
        ]);
        assert_eq!(f.to_string(), "(x@1 + 1) < y && (x@1 == 0 || y == 2)");
    }
}
