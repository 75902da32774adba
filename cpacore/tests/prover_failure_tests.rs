use std::sync::Arc;

use cpacfa::{Cfa, CfaBuilder, CmpOp, Expr, Var};
use cpacore::prelude::*;
use cpaformal::{prelude::*, tests_utils::BoundedProver};
use parking_lot::Mutex;

/// Prover that gives up on every query.
struct ExhaustedProver;

impl TheoremProver for ExhaustedProver {
    fn push_context(&mut self) {}

    fn pop_context(&mut self) {}

    fn assert_formula(&mut self, _formula: &Formula) -> ProverResult<()> {
        Ok(())
    }

    fn check_sat(&mut self) -> ProverResult<bool> {
        Err(ProverError::ResourceExhausted { steps: 1 })
    }
}

fn loop_program() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    builder
        .define(main, |f| {
            f.assign("x", 0);
            f.while_loop(Expr::var("x").lt(10), |f| {
                f.assign("x", Expr::var("x") + 1);
            });
            f.assert(Expr::var("x").equals(10));
        })
        .unwrap();
    builder.build(main).unwrap()
}

fn algorithm(prover: BoundedProver, shutdown: ShutdownNotifier) -> CpaAlgorithm {
    let cfa = Arc::new(loop_program());
    let prover = prover.shared();
    let cpa = PredicateCpa::new(cfa.clone(), AnalysisConfig::default(), prover.clone()).unwrap();
    let refiner = Refiner::new(cfa, cpa.abstraction().clone(), prover, cpa.precision().clone());
    CpaAlgorithm::new(cpa, refiner, shutdown).unwrap()
}

#[test]
fn prover_failure_aborts_with_its_operation() {
    let mut algorithm = algorithm(BoundedProver::new().with_step_budget(Some(0)), ShutdownNotifier::new());
    match algorithm.run() {
        Err(CpaError::Prover {
            operation, location, ..
        }) => {
            assert_eq!(operation, Operation::Abstraction);
            assert!(location.is_some());
        }
        other => panic!("expected a prover failure, got {other:?}"),
    }
}

#[test]
fn requested_shutdown_interrupts_the_run() {
    let shutdown = ShutdownNotifier::new();
    shutdown.request_shutdown("user");
    let mut algorithm = algorithm(BoundedProver::new(), shutdown);

    let error = algorithm.run().unwrap_err();
    assert!(matches!(&error, CpaError::Interrupted { reason } if reason == "user"));
    assert!(algorithm.cpa().precision().read().is_empty());
}

#[test]
fn interrupted_prover_query_interrupts_the_run() {
    let notifier = ShutdownNotifier::new();
    notifier.request_shutdown("deadline");
    let mut algorithm = algorithm(BoundedProver::new().with_shutdown(notifier), ShutdownNotifier::new());

    let error = algorithm.run().unwrap_err();
    assert!(error.is_interrupted());
    assert_eq!(algorithm.refinements(), 0);
    assert!(algorithm.cpa().precision().read().is_empty());
}

#[test]
fn coverage_check_failure_is_reported() {
    let cfa = loop_program();
    let prover: SharedProver = Arc::new(Mutex::new(ExhaustedProver));
    let manager = AbstractionManager::new(prover, true);

    let atom = |name: &str| Formula::compare(CmpOp::Gt, Term::var(Symbol::unindexed(Var::new(name))), 0);
    let p = manager.make_predicate(&atom("x")).unwrap();
    let q = manager.make_predicate(&atom("y")).unwrap();
    let (p, q) = (manager.predicate_formula(p), manager.predicate_formula(q));

    let mut arg = Arg::new();
    let existing = arg.set_root(AbstractState::initial(cfa.entry(), q));
    let mut reached = ReachedSet::new();
    reached.add(existing, cfa.entry());

    let stop = PredicateStop::new(Arc::new(manager));
    let candidate = AbstractState::initial(cfa.entry(), p);
    match stop.stop(&candidate, &reached, &arg) {
        Err(CpaError::Prover { operation, .. }) => assert_eq!(operation, Operation::CoverageCheck),
        other => panic!("expected a coverage failure, got {other:?}"),
    }
}
