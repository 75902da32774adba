//! Program-level expressions carried by CFA edges.
//!
//! Integer expressions ([`Expr`]) appear on the right-hand side of assignments,
//! declarations and call bindings; conditions ([`Cond`]) guard assume edges.
//! Both are plain trees with public variants, easy to construct by hand or with
//! the builder helpers below.
//!
//! Variable names are program-wide: a front-end is expected to qualify locals
//! with their function (e.g. `f::x`) before handing the CFA over.
use std::{collections::BTreeSet, fmt, sync::Arc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumIter, EnumTryAs, IntoStaticStr};

/// Program variable identifier.
///
/// Cheap to clone (reference counted) and totally ordered so that it can key
/// ordered maps deterministically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Var(Arc<str>);

impl Var {
    pub fn new(name: impl AsRef<str>) -> Self {
        Var(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Var {
    fn from(value: &str) -> Self {
        Var::new(value)
    }
}

/// Binary comparison between two integer expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CmpOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

impl CmpOp {
    /// Operator `op'` such that `!(a op b) <=> a op' b`.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// Operator `op'` such that `a op b <=> b op' a`.
    pub fn swap(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    /// Evaluate the comparison on concrete values.
    pub fn holds<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }

    pub fn to_str(self) -> &'static str {
        self.into()
    }
}

/// Arithmetic operators available in integer expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
}

impl BinaryOp {
    pub fn to_str(self) -> &'static str {
        self.into()
    }
}

/// Integer-valued program expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Expr {
    Lit(i64),
    Var(Var),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl AsRef<str>) -> Self {
        Expr::Var(Var::new(name))
    }

    pub fn lit(value: i64) -> Self {
        Expr::Lit(value)
    }

    fn cmp(self, op: CmpOp, rhs: impl Into<Expr>) -> Cond {
        Cond::Cmp(op, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Cond {
        self.cmp(CmpOp::Ge, rhs)
    }

    /// Collect every variable read by this expression.
    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        match self {
            Expr::Lit(_) => {}
            Expr::Var(var) => {
                out.insert(var.clone());
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Lit(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Lit(value as i64)
    }
}

impl From<Var> for Expr {
    fn from(value: Var) -> Self {
        Expr::Var(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::var(value)
    }
}

macro_rules! define_expr_binop {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::Binary(BinaryOp::$op, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

define_expr_binop!(Add, add, Add);
define_expr_binop!(Sub, sub, Sub);
define_expr_binop!(Mul, mul, Mul);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(value) => write!(f, "{value}"),
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Neg(inner) => write!(f, "-({inner})"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.to_str()),
        }
    }
}

/// Boolean condition guarding an assume edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cond {
    Lit(bool),
    Cmp(CmpOp, Expr, Expr),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    pub fn and(self, other: Cond) -> Cond {
        Cond::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Cond) -> Cond {
        Cond::Or(Box::new(self), Box::new(other))
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        match self {
            Cond::Lit(_) => {}
            Cond::Cmp(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Cond::Not(inner) => inner.collect_variables(out),
            Cond::And(lhs, rhs) | Cond::Or(lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

impl std::ops::Not for Cond {
    type Output = Cond;

    fn not(self) -> Cond {
        Cond::Not(Box::new(self))
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Lit(value) => write!(f, "{value}"),
            Cond::Cmp(op, lhs, rhs) => write!(f, "{lhs} {} {rhs}", op.to_str()),
            Cond::Not(inner) => write!(f, "!({inner})"),
            Cond::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Cond::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn negated_operator_is_complement() {
        for op in CmpOp::iter() {
            for (a, b) in [(0, 1), (1, 1), (2, 1)] {
                assert_eq!(op.holds(a, b), !op.negate().holds(a, b), "{op:?} on ({a}, {b})");
                assert_eq!(op.holds(a, b), op.swap().holds(b, a), "{op:?} swapped on ({a}, {b})");
            }
        }
    }

    #[test]
    fn builders_produce_expected_trees() {
        let cond = (Expr::var("x") + 1).lt(Expr::var("y") * 2);
        assert_eq!(cond.to_string(), "(x + 1) < (y * 2)");

        let mut vars = BTreeSet::new();
        cond.collect_variables(&mut vars);
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec![Var::new("x"), Var::new("y")]);
    }
}
