//! Programmatic construction of control-flow automata.
//!
//! Functions are first declared (which allocates their entry and exit
//! locations) and then defined with structured statements:
//!
//! ```
//! use cpacfa::{CfaBuilder, Expr};
//!
//! let mut builder = CfaBuilder::new();
//! let main = builder.declare("main", &[]).unwrap();
//! builder
//!     .define(main, |f| {
//!         f.assign("x", 0);
//!         f.while_loop(Expr::var("x").lt(10), |f| {
//!             f.assign("x", Expr::var("x") + 1);
//!         });
//!         f.assert(Expr::var("x").equals(10));
//!     })
//!     .unwrap();
//! let cfa = builder.build(main).unwrap();
//! assert_eq!(cfa.locations().filter(|&l| cfa.is_loop_head(l)).count(), 1);
//! ```
use petgraph::graph::DiGraph;

use crate::{
    cfa::{Cfa, FunctionInfo, Location, LocationFlags, LocationInfo},
    edge::{EdgeId, EdgeKind, FunctionId},
    error::{CfaError, CfaResult},
    expr::{Cond, Expr, Var},
};

#[derive(Debug, Default)]
pub struct CfaBuilder {
    graph: DiGraph<LocationInfo, EdgeKind>,
    functions: Vec<FunctionInfo>,
    defined: Vec<bool>,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_location(graph: &mut DiGraph<LocationInfo, EdgeKind>, function: FunctionId) -> Location {
        Location(graph.add_node(LocationInfo {
            function,
            flags: LocationFlags::empty(),
        }))
    }

    /// Declare a function and allocate its entry and exit locations.
    pub fn declare(&mut self, name: &str, params: &[&str]) -> CfaResult<FunctionId> {
        if self.functions.iter().any(|info| info.name == name) {
            return Err(CfaError::DuplicateFunction { name: name.to_string() });
        }

        let id = FunctionId(self.functions.len() as u32);
        let entry = Self::add_location(&mut self.graph, id);
        let exit = Self::add_location(&mut self.graph, id);
        self.functions.push(FunctionInfo {
            name: name.to_string(),
            params: params.iter().map(|param| Var::new(param)).collect(),
            return_var: Var::new(format!("{name}::$ret")),
            entry,
            exit,
        });
        self.defined.push(false);
        Ok(id)
    }

    pub fn function(&self, name: &str) -> CfaResult<FunctionId> {
        self.functions
            .iter()
            .position(|info| info.name == name)
            .map(|index| FunctionId(index as u32))
            .ok_or_else(|| CfaError::UnknownFunction { name: name.to_string() })
    }

    /// Define the body of a declared function. Falling off the end of the
    /// body returns to the caller.
    pub fn define(&mut self, id: FunctionId, body: impl FnOnce(&mut FunctionBuilder<'_>)) -> CfaResult<()> {
        let Some(info) = self.functions.get(id.index()) else {
            return Err(CfaError::UnknownFunction {
                name: format!("#{}", id.0),
            });
        };
        if self.defined[id.index()] {
            return Err(CfaError::AlreadyDefined {
                name: info.name.clone(),
            });
        }

        let (entry, exit) = (info.entry, info.exit);
        let mut function = FunctionBuilder {
            graph: &mut self.graph,
            functions: &self.functions,
            function: id,
            cursor: entry,
            error: None,
        };
        body(&mut function);
        if let Some(error) = function.error {
            return Err(error);
        }
        let cursor = function.cursor;
        function.add_edge(cursor, exit, EdgeKind::Blank);

        self.defined[id.index()] = true;
        Ok(())
    }

    pub fn build(self, main: FunctionId) -> CfaResult<Cfa> {
        if let Some(index) = self.defined.iter().position(|defined| !defined) {
            return Err(CfaError::MissingBody {
                name: self.functions[index].name.clone(),
            });
        }
        Cfa::new(self.graph, self.functions, main)
    }
}

/// Appends statements to a function body.
///
/// The builder keeps a cursor on the location where the next statement
/// starts. The first error is recorded and reported by
/// [`CfaBuilder::define`].
pub struct FunctionBuilder<'b> {
    graph: &'b mut DiGraph<LocationInfo, EdgeKind>,
    functions: &'b [FunctionInfo],
    function: FunctionId,
    cursor: Location,
    error: Option<CfaError>,
}

impl FunctionBuilder<'_> {
    pub fn cursor(&self) -> Location {
        self.cursor
    }

    pub fn set_cursor(&mut self, location: Location) -> &mut Self {
        self.cursor = location;
        self
    }

    pub fn new_location(&mut self) -> Location {
        CfaBuilder::add_location(self.graph, self.function)
    }

    pub fn add_edge(&mut self, from: Location, to: Location, kind: EdgeKind) -> EdgeId {
        EdgeId(self.graph.add_edge(from.0, to.0, kind))
    }

    pub fn mark_target(&mut self, location: Location) -> &mut Self {
        self.graph[location.0].flags |= LocationFlags::TARGET;
        self
    }

    fn step(&mut self, kind: EdgeKind) -> &mut Self {
        let next = self.new_location();
        self.add_edge(self.cursor, next, kind);
        self.cursor = next;
        self
    }

    pub fn assume(&mut self, cond: Cond) -> &mut Self {
        self.step(EdgeKind::Assume { cond, branch: true })
    }

    pub fn assign(&mut self, lhs: impl Into<Var>, rhs: impl Into<Expr>) -> &mut Self {
        self.step(EdgeKind::Assignment {
            lhs: lhs.into(),
            rhs: rhs.into(),
        })
    }

    pub fn declare(&mut self, var: impl Into<Var>, init: Option<Expr>) -> &mut Self {
        self.step(EdgeKind::Declaration { var: var.into(), init })
    }

    pub fn skip(&mut self) -> &mut Self {
        self.step(EdgeKind::Blank)
    }

    pub fn if_then_else(
        &mut self,
        cond: Cond,
        then_branch: impl FnOnce(&mut Self),
        else_branch: impl FnOnce(&mut Self),
    ) -> &mut Self {
        let fork = self.cursor;
        let join = self.new_location();
        self.branch_arm(fork, join, cond.clone(), true, then_branch);
        self.branch_arm(fork, join, cond, false, else_branch);
        self.cursor = join;
        self
    }

    fn branch_arm(&mut self, fork: Location, join: Location, cond: Cond, branch: bool, body: impl FnOnce(&mut Self)) {
        let start = self.new_location();
        self.add_edge(fork, start, EdgeKind::Assume { cond, branch });
        self.cursor = start;
        body(self);
        self.add_edge(self.cursor, join, EdgeKind::Blank);
    }

    pub fn if_then(&mut self, cond: Cond, then_branch: impl FnOnce(&mut Self)) -> &mut Self {
        self.if_then_else(cond, then_branch, |_| {})
    }

    /// `while (cond) body`; the current location becomes the loop head.
    pub fn while_loop(&mut self, cond: Cond, body: impl FnOnce(&mut Self)) -> &mut Self {
        let head = self.cursor;
        let start = self.new_location();
        self.add_edge(
            head,
            start,
            EdgeKind::Assume {
                cond: cond.clone(),
                branch: true,
            },
        );
        self.cursor = start;
        body(self);
        self.add_edge(self.cursor, head, EdgeKind::Blank);

        self.cursor = head;
        self.step(EdgeKind::Assume { cond, branch: false })
    }

    /// Branch to a fresh target location when `cond` does not hold.
    pub fn assert(&mut self, cond: Cond) -> &mut Self {
        let target = self.new_location();
        self.mark_target(target);
        self.add_edge(
            self.cursor,
            target,
            EdgeKind::Assume {
                cond: cond.clone(),
                branch: false,
            },
        );
        self.assume(cond)
    }

    /// Call `callee` with `args`, optionally storing its return value.
    pub fn call(&mut self, callee: FunctionId, args: Vec<Expr>, result: Option<Var>) -> &mut Self {
        let Some(info) = self.functions.get(callee.index()) else {
            self.error.get_or_insert(CfaError::UnknownFunction {
                name: format!("#{}", callee.0),
            });
            return self;
        };
        if info.params.len() != args.len() {
            self.error.get_or_insert(CfaError::ArityMismatch {
                callee: info.name.clone(),
                expected: info.params.len(),
                found: args.len(),
            });
            return self;
        }

        let (entry, exit) = (info.entry, info.exit);
        let bindings = info.params.iter().cloned().zip(args).collect();
        let value = Some(Expr::Var(info.return_var.clone()));
        let return_site = self.new_location();

        self.add_edge(
            self.cursor,
            entry,
            EdgeKind::Call {
                callee,
                bindings,
                return_site,
            },
        );
        self.add_edge(exit, return_site, EdgeKind::Return { value, result });
        self.cursor = return_site;
        self
    }

    /// Return `value` to the caller. Statements after a return are unreachable.
    pub fn ret(&mut self, value: impl Into<Expr>) -> &mut Self {
        let return_var = self.functions[self.function.index()].return_var.clone();
        self.assign(return_var, value);
        self.ret_void()
    }

    pub fn ret_void(&mut self) -> &mut Self {
        let exit = self.functions[self.function.index()].exit;
        self.add_edge(self.cursor, exit, EdgeKind::Blank);
        self.cursor = self.new_location();
        self
    }
}
