use std::sync::Arc;

use cpacfa::{Cfa, CfaBuilder, CmpOp, Expr, Location, Var};
use cpacore::prelude::*;
use cpaformal::{prelude::*, tests_utils::BoundedProver};

fn analyze_with(cfa: Cfa, config: AnalysisConfig, prover: BoundedProver) -> (CpaResult<AnalysisOutcome>, CpaAlgorithm) {
    let cfa = Arc::new(cfa);
    let prover = prover.shared();
    let cpa = PredicateCpa::new(cfa.clone(), config, prover.clone()).expect("valid configuration");
    let refiner = Refiner::new(cfa, cpa.abstraction().clone(), prover, cpa.precision().clone());
    let mut algorithm = CpaAlgorithm::new(cpa, refiner, ShutdownNotifier::new()).expect("valid configuration");
    let outcome = algorithm.run();
    (outcome, algorithm)
}

fn analyze(cfa: Cfa, config: AnalysisConfig) -> (CpaResult<AnalysisOutcome>, CpaAlgorithm) {
    analyze_with(cfa, config, BoundedProver::new())
}

fn expect_safe(outcome: CpaResult<AnalysisOutcome>, cfa: &Cfa) -> FixpointReport {
    let report = match outcome {
        Ok(AnalysisOutcome::Safe(report)) => report,
        other => panic!("expected a safe outcome, got {other:?}"),
    };
    assert!(report.reached.iter().all(|state| !cfa.is_target(state.location())));
    report
}

fn block_size(size: usize) -> AnalysisConfig {
    AnalysisConfig {
        block_size: size,
        ..AnalysisConfig::default()
    }
}

/// `if (x > 0) y = 1; else y = -1; assert(y != 0);`
fn branch_program() -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    builder
        .define(main, |f| {
            f.if_then_else(
                Expr::var("x").gt(0),
                |f| {
                    f.assign("y", 1);
                },
                |f| {
                    f.assign("y", -1);
                },
            );
            f.assert(Expr::var("y").not_equals(0));
        })
        .unwrap();
    builder.build(main).unwrap()
}

/// `[x = 0;] while (x < 10) x = x + 1; assert(x == 10);`
fn counting_loop(initialized: bool) -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    builder
        .define(main, |f| {
            if initialized {
                f.assign("x", 0);
            }
            f.while_loop(Expr::var("x").lt(10), |f| {
                f.assign("x", Expr::var("x") + 1);
            });
            f.assert(Expr::var("x").equals(10));
        })
        .unwrap();
    builder.build(main).unwrap()
}

/// `inc(a) { return a + 1; }  x = 0; y = inc(x); assert(y == expected);`
fn call_program(expected: i64) -> Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    let inc = builder.declare("inc", &["a"]).unwrap();
    builder
        .define(inc, |f| {
            f.ret(Expr::var("a") + 1);
        })
        .unwrap();
    builder
        .define(main, |f| {
            f.assign("x", 0);
            f.call(inc, vec![Expr::var("x")], Some("y".into()));
            f.assert(Expr::var("y").equals(expected));
        })
        .unwrap();
    builder.build(main).unwrap()
}

#[test]
fn violation_infeasible_in_its_block_needs_no_refinement() {
    let (outcome, algorithm) = analyze(branch_program(), AnalysisConfig::default());
    let report = expect_safe(outcome, &branch_program());
    assert_eq!(report.refinements, 0);
    assert_eq!(algorithm.refinements(), 0);
}

#[test]
fn single_edge_blocks_are_refined_until_safe() {
    let (outcome, _) = analyze(branch_program(), block_size(1));
    let report = expect_safe(outcome, &branch_program());
    assert!(report.refinements >= 1);
    assert!(report.refinements <= 2);
    assert!(!report.precision.is_empty());
}

#[test]
fn seeded_branch_predicate_is_refined_with_the_joined_variable() {
    for size in 1..=3 {
        let cfa = Arc::new(branch_program());
        let prover = BoundedProver::new().shared();
        let cpa = PredicateCpa::new(cfa.clone(), block_size(size), prover.clone()).unwrap();
        let manager = cpa.abstraction().clone();
        let x = Term::var(Symbol::unindexed(Var::new("x")));
        let positive = manager.make_predicate(&Formula::compare(CmpOp::Gt, x, 0)).unwrap();
        cpa.precision().write().add_global(positive);

        let refiner = Refiner::new(cfa.clone(), manager.clone(), prover, cpa.precision().clone());
        let mut algorithm = CpaAlgorithm::new(cpa, refiner, ShutdownNotifier::new()).unwrap();
        let report = expect_safe(algorithm.run(), &cfa);
        assert!(report.refinements <= 2, "block size {size}: {} refinement(s)", report.refinements);
        assert!(report.precision.global().contains(&positive));

        let y = Var::new("y");
        let mentions_y = report
            .precision
            .locations()
            .flat_map(|(_, predicates)| predicates.iter())
            .any(|id| manager.predicate(*id).symbols().iter().any(|symbol| symbol.var == y));
        assert!(mentions_y, "block size {size}: no predicate over y");
    }
}

#[test]
fn uninitialized_loop_counter_is_a_real_bug() {
    let cfa = counting_loop(false);
    let (outcome, _) = analyze(cfa.clone(), AnalysisConfig::default());
    let counterexample = match outcome {
        Ok(AnalysisOutcome::Unsafe(counterexample)) => counterexample,
        other => panic!("expected a counterexample, got {other:?}"),
    };

    assert_eq!(counterexample.locations.first(), Some(&cfa.entry()));
    let last = *counterexample.locations.last().unwrap();
    assert!(cfa.is_target(last));
    assert_eq!(counterexample.edges.len(), counterexample.locations.len() - 1);
    assert_eq!(counterexample.steps.len(), counterexample.edges.len());
    assert!(counterexample.to_string().contains("->"));
}

#[test]
fn counting_loop_is_proved_by_refinement() {
    let cfa = counting_loop(true);
    let config = AnalysisConfig {
        max_refinements: Some(40),
        ..AnalysisConfig::default()
    };
    let (outcome, algorithm) = analyze(cfa.clone(), config);
    let report = expect_safe(outcome, &cfa);
    assert!(report.refinements > 0);

    let head = cfa.locations().find(|&l| cfa.is_loop_head(l)).unwrap();
    assert!(!report.precision.predicates_at(head).is_empty());
    assert_eq!(report.arg_nodes, algorithm.arg().len());
}

#[test]
fn function_result_flows_through_deferred_return() {
    let cfa = call_program(1);
    let (outcome, _) = analyze(cfa.clone(), AnalysisConfig::default());
    let report = expect_safe(outcome, &cfa);
    assert!(report.refinements <= 1);

    let cfa = call_program(2);
    let (outcome, _) = analyze(cfa.clone(), AnalysisConfig::default());
    match outcome {
        Ok(AnalysisOutcome::Unsafe(counterexample)) => {
            let inc = cfa.function_by_name("inc").unwrap();
            assert!(counterexample.locations.contains(&cfa.function(inc).entry));
        }
        other => panic!("expected a counterexample, got {other:?}"),
    }
}

#[test]
fn contradicting_assumptions_are_pruned_by_the_satisfiability_check() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    let mut end: Option<Location> = None;
    builder
        .define(main, |f| {
            f.assume(Expr::var("x").gt(0));
            f.assume(Expr::var("x").lt(0));
            end = Some(f.cursor());
        })
        .unwrap();
    let cfa = builder.build(main).unwrap();
    let end = end.unwrap();

    let config = AnalysisConfig {
        sat_check_block_size: 1,
        ..AnalysisConfig::default()
    };
    let (outcome, _) = analyze(cfa.clone(), config);
    let report = expect_safe(outcome, &cfa);
    assert!(report.reached.iter().all(|state| state.location() != end));
    assert!(report.reached.iter().all(|state| state.location() != cfa.function(main).exit));
}

#[test]
fn loop_head_revisit_is_covered_by_the_root() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    builder
        .define(main, |f| {
            f.while_loop(Expr::var("x").lt(10), |f| {
                f.assign("x", Expr::var("x") + 1);
            });
        })
        .unwrap();
    let cfa = builder.build(main).unwrap();

    let (outcome, algorithm) = analyze(cfa.clone(), AnalysisConfig::default());
    let report = expect_safe(outcome, &cfa);
    assert_eq!(report.refinements, 0);
    assert_eq!(report.covered, 1);

    let arg = algorithm.arg();
    let root = arg.root().unwrap();
    for (id, node) in arg.iter() {
        if let Some(coverer) = node.covered_by() {
            assert_eq!(coverer, root);
            assert!(arg[coverer].covered_by().is_none());
            assert!(!algorithm.reached().contains(id));
            assert!(node.children().is_empty());
        }
    }
}

#[test]
fn time_limit_yields_unknown() {
    let config = AnalysisConfig {
        time_limit_ms: Some(0),
        ..AnalysisConfig::default()
    };
    let (outcome, _) = analyze(counting_loop(true), config);
    assert!(matches!(outcome, Ok(AnalysisOutcome::Unknown { .. })));
}

#[test]
fn refinement_limit_yields_unknown() {
    let config = AnalysisConfig {
        block_size: 1,
        max_refinements: Some(0),
        ..AnalysisConfig::default()
    };
    let (outcome, algorithm) = analyze(branch_program(), config);
    assert!(matches!(outcome, Ok(AnalysisOutcome::Unknown { .. })));
    assert_eq!(algorithm.refinements(), 1);
}

#[test]
fn breadth_first_traversal_is_rejected() {
    let cfa = Arc::new(branch_program());
    let prover = BoundedProver::new().shared();
    let config = AnalysisConfig {
        traversal: Traversal::BreadthFirst,
        ..AnalysisConfig::default()
    };
    let error = PredicateCpa::new(cfa, config, prover).unwrap_err();
    assert!(error.is_config());
}

#[test]
fn runs_are_deterministic() {
    let run = || {
        let (outcome, algorithm) = analyze(branch_program(), block_size(1));
        (expect_safe(outcome, &branch_program()), algorithm.arg().len())
    };
    let (first, first_nodes) = run();
    let (second, second_nodes) = run();

    assert_eq!(first.reached, second.reached);
    assert_eq!(first.precision, second.precision);
    assert_eq!(first.refinements, second.refinements);
    assert_eq!(first_nodes, second_nodes);
}
