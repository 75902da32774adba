use cpacfa::{CfaBuilder, CfaError, EdgeKind, EdgeType, Expr, LocationFlags, Var};

fn counting_loop() -> cpacfa::Cfa {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).expect("declare main");
    builder
        .define(main, |f| {
            f.assign("x", 0);
            f.while_loop(Expr::var("x").lt(10), |f| {
                f.assign("x", Expr::var("x") + 1);
            });
            f.assert(Expr::var("x").equals(10));
        })
        .expect("define main");
    builder.build(main).expect("valid cfa")
}

#[test]
fn while_loop_head_is_detected() {
    let cfa = counting_loop();
    let heads: Vec<_> = cfa.locations().filter(|&l| cfa.is_loop_head(l)).collect();
    assert_eq!(heads.len(), 1);

    let head = heads[0];
    let entering: Vec<_> = cfa.entering_edges(head).iter().map(|e| e.kind.edge_type()).collect();
    assert_eq!(entering, vec![EdgeType::Assignment, EdgeType::Blank]);
    assert!(cfa.is_function_entry(cfa.entry()));
    assert!(!cfa.is_loop_head(cfa.entry()));
}

#[test]
fn assert_creates_a_single_target_taken_first() {
    let cfa = counting_loop();
    let targets: Vec<_> = cfa.locations().filter(|&l| cfa.is_target(l)).collect();
    assert_eq!(targets.len(), 1);

    let check = cfa.entering_edges(targets[0])[0].predecessor;
    let leaving = cfa.leaving_edges(check);
    assert_eq!(leaving.len(), 2);
    assert_eq!(leaving[0].successor, targets[0]);
    assert!(matches!(leaving[0].kind, EdgeKind::Assume { branch: false, .. }));
    assert!(matches!(leaving[1].kind, EdgeKind::Assume { branch: true, .. }));
    assert!(cfa.leaving_edges(targets[0]).is_empty());
}

#[test]
fn branches_do_not_introduce_loop_heads() {
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
    let cfa = builder.build(main).unwrap();

    assert!(cfa.locations().all(|l| !cfa.is_loop_head(l)));
    assert_eq!(cfa.leaving_edges(cfa.entry()).len(), 2);
    assert_eq!(
        cfa.variables().into_iter().collect::<Vec<_>>(),
        vec![Var::new("x"), Var::new("y")]
    );
}

#[test]
fn calls_mark_return_sites_and_keep_summary_loops() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    let inc = builder.declare("inc", &["inc::a"]).unwrap();
    builder
        .define(inc, |f| {
            f.ret(Expr::var("inc::a") + 1);
        })
        .unwrap();
    builder
        .define(main, |f| {
            f.assign("x", 0);
            f.while_loop(Expr::var("x").lt(3), |f| {
                f.call(inc, vec![Expr::var("x")], Some(Var::new("x")));
            });
        })
        .unwrap();
    let cfa = builder.build(main).unwrap();

    let return_sites: Vec<_> = cfa.locations().filter(|&l| cfa.has_call_return_edge(l)).collect();
    assert_eq!(return_sites.len(), 1);
    assert_eq!(cfa.function_of(return_sites[0]), main);

    let exit = cfa.function(inc).exit;
    assert!(cfa.flags(exit).contains(LocationFlags::FUNCTION_EXIT));
    let returns = cfa.leaving_edges(exit);
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].successor, return_sites[0]);

    // The loop closes through the call, via the call-to-return summary.
    let heads: Vec<_> = cfa.locations().filter(|&l| cfa.is_loop_head(l)).collect();
    assert_eq!(heads.len(), 1);
    assert_eq!(cfa.function_of(heads[0]), main);
    assert_eq!(cfa.function_by_name("inc"), Some(inc));
}

#[test]
fn recursion_is_rejected() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    let even = builder.declare("even", &[]).unwrap();
    let odd = builder.declare("odd", &[]).unwrap();
    builder.define(main, |f| {
        f.call(even, vec![], None);
    }).unwrap();
    builder.define(even, |f| {
        f.call(odd, vec![], None);
    }).unwrap();
    builder.define(odd, |f| {
        f.call(even, vec![], None);
    }).unwrap();

    let err = builder.build(main).unwrap_err();
    assert_eq!(err, CfaError::RecursiveCall { name: "even".to_string() });
}

#[test]
fn self_recursion_is_rejected() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    builder.define(main, |f| {
        f.call(main, vec![], None);
    }).unwrap();
    assert!(builder.build(main).unwrap_err().is_recursive_call());
}

#[test]
fn malformed_programs_are_reported() {
    let mut builder = CfaBuilder::new();
    let main = builder.declare("main", &[]).unwrap();
    assert!(builder.declare("main", &[]).unwrap_err().is_duplicate_function());

    let callee = builder.declare("callee", &["callee::a"]).unwrap();
    let err = builder
        .define(main, |f| {
            f.call(callee, vec![], None);
        })
        .unwrap_err();
    assert_eq!(
        err,
        CfaError::ArityMismatch {
            callee: "callee".to_string(),
            expected: 1,
            found: 0,
        }
    );

    builder.define(main, |f| {
        f.skip();
    }).unwrap();
    assert!(builder.define(main, |_| {}).unwrap_err().is_already_defined());
    assert!(builder.function("nope").unwrap_err().is_unknown_function());
    assert!(builder.build(main).unwrap_err().is_missing_body());
}
