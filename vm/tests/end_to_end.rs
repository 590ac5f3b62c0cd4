//! End-to-end scenarios: compile, seed a controller, drive to completion.

#[allow(dead_code, unreachable_pub)]
mod helpers;

use assert_matches::assert_matches;
use hark_types::{Expr, Fault, FnDef, Module, PrimOp, ThreadId, Value};
use hark_vm::{ForeignRegistry, ObsEvent, RunOutcome};

// ============================================================================
// Spec scenarios
// ============================================================================

#[test]
fn scenario_literal_addition() {
    let (outcome, _) = helpers::run_single_mem(&helpers::arith_module(), ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(3)));
}

#[test]
fn scenario_let_binding() {
    let (outcome, _) = helpers::run_single_mem(&helpers::let_module(), ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(6)));
}

#[test]
fn scenario_function_call() {
    let (outcome, _) = helpers::run_single_mem(&helpers::call_module(), ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(42)));
}

#[test]
fn scenario_fork_join() {
    let (outcome, _) =
        helpers::run_single_mem(&helpers::fork_join_module(), ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(5050)));
}

#[test]
fn scenario_fork_join_under_pool() {
    for workers in [2, 4, 8] {
        let (outcome, _) =
            helpers::run_pooled_mem(&helpers::fork_join_module(), ForeignRegistry::new(), workers, 8);
        assert_eq!(outcome, RunOutcome::Finished(Value::Int(5050)));
    }
}

#[test]
fn scenario_readme_concurrent() {
    // concurrent(5) = 1000*(5+1) + (10*(5-1))*(-1) = 5960, whichever branch
    // completes first.
    let (outcome, _) = helpers::run_single_mem(&helpers::readme_module(), helpers::rs_registry());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(5960)));

    for workers in [2, 8] {
        let (outcome, _) =
            helpers::run_pooled_mem(&helpers::readme_module(), helpers::rs_registry(), workers, 4);
        assert_eq!(outcome, RunOutcome::Finished(Value::Int(5960)));
    }
}

#[test]
fn scenario_error_propagates_through_await() {
    let (outcome, _) = helpers::run_single_mem(&helpers::error_module(), ForeignRegistry::new());
    let RunOutcome::Errored(signal) = outcome else {
        panic!("expected an errored outcome, got {outcome:?}");
    };
    assert_eq!(signal.fault, Fault::DivisionByZero);
    // Origin is the spawned thread; the signal flowed through the root.
    assert_eq!(signal.origin, ThreadId(1));
    assert_eq!(signal.path, vec![ThreadId(1), ThreadId(0)]);
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn empty_argument_list_call() {
    let module = Module {
        functions: vec![
            FnDef {
                name: "seven".into(),
                params: vec![],
                body: Expr::int(7),
            },
            FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::call("seven", vec![]),
            },
        ],
        imports: vec![],
    };
    let (outcome, _) = helpers::run_single_mem(&module, ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(7)));
}

#[test]
fn await_on_resolved_future_does_not_suspend() {
    // Under the FIFO scheduler both children finish before the root's second
    // await. The root requests a block twice (once per await) but suspends —
    // and is woken — only once: the second await finds the future resolved
    // at commit and the value is injected without a waiting transition.
    let module = helpers::fork_join_module();
    let controller = helpers::memory_controller(&module);
    let mut driver = hark_vm::SingleThreadDriver::new(
        controller,
        ForeignRegistry::new(),
        hark_vm::RunConfig::default(),
    );
    let (root, _) = driver.start("main", vec![]).unwrap();
    let outcome = driver.run().unwrap();
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(5050)));

    let block_requests = driver
        .trace()
        .iter()
        .filter(|e| matches!(e, ObsEvent::Blocked { thread, .. } if *thread == root))
        .count();
    let wakes = driver
        .trace()
        .iter()
        .filter(|e| matches!(e, ObsEvent::Woken { thread } if *thread == root))
        .count();
    assert_eq!(block_requests, 2);
    assert_eq!(wakes, 1, "the second await must not suspend");
}

#[test]
fn calling_a_non_function_value_errors_the_program() {
    let module = Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body: Expr::let_in(
                "f",
                Expr::int(5),
                Expr::Call {
                    callee: Box::new(Expr::var("f")),
                    args: vec![],
                },
            ),
        }],
        imports: vec![],
    };
    let (outcome, _) = helpers::run_single_mem(&module, ForeignRegistry::new());
    let RunOutcome::Errored(signal) = outcome else {
        panic!("expected an errored outcome");
    };
    assert_matches!(signal.fault, Fault::TypeMismatch { .. });
}

#[test]
fn division_by_zero_in_root_reports_directly() {
    let module = Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body: Expr::prim2(PrimOp::Div, Expr::int(1), Expr::int(0)),
        }],
        imports: vec![],
    };
    let (outcome, _) = helpers::run_single_mem(&module, ForeignRegistry::new());
    let RunOutcome::Errored(signal) = outcome else {
        panic!("expected an errored outcome");
    };
    assert_eq!(signal.fault, Fault::DivisionByZero);
    assert_eq!(signal.path, vec![ThreadId(0)]);
}

#[test]
fn foreign_failure_surfaces_with_reason() {
    let module = Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body: Expr::call("boom", vec![]),
        }],
        imports: vec![hark_types::Import {
            name: "boom".into(),
            target: "host/boom".into(),
            arity: 0,
        }],
    };
    let mut registry = ForeignRegistry::new();
    registry.register("host/boom", 0, |_| Err("host exploded".to_string()));
    let (outcome, _) = helpers::run_single_mem(&module, registry);
    let RunOutcome::Errored(signal) = outcome else {
        panic!("expected an errored outcome");
    };
    assert_matches!(
        signal.fault,
        Fault::ForeignError { ref reason, .. } if reason == "host exploded"
    );
}

// ============================================================================
// Print ordering
// ============================================================================

#[test]
fn print_output_is_preserved_in_program_order() {
    let module = Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body: Expr::let_in(
                "_",
                Expr::Prim {
                    op: PrimOp::Print,
                    args: vec![Expr::int(1)],
                },
                Expr::let_in(
                    "_",
                    Expr::Prim {
                        op: PrimOp::Print,
                        args: vec![Expr::Literal(Value::Str("two".into()))],
                    },
                    Expr::int(0),
                ),
            ),
        }],
        imports: vec![],
    };
    let (outcome, stdout) = helpers::run_single_mem(&module, ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(Value::Int(0)));
    assert_eq!(stdout, vec!["1".to_string(), "two".to_string()]);
}

#[test]
fn partial_print_output_survives_an_error() {
    let module = Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body: Expr::let_in(
                "_",
                Expr::Prim {
                    op: PrimOp::Print,
                    args: vec![Expr::int(9)],
                },
                Expr::prim2(PrimOp::Div, Expr::int(1), Expr::int(0)),
            ),
        }],
        imports: vec![],
    };
    let (outcome, stdout) = helpers::run_single_mem(&module, ForeignRegistry::new());
    assert_matches!(outcome, RunOutcome::Errored(_));
    assert_eq!(stdout, vec!["9".to_string()]);
}

// ============================================================================
// Determinism of async-free programs (any scheduler choice)
// ============================================================================

#[test]
fn sequential_fragments_are_scheduler_independent() {
    let module = Module {
        functions: vec![
            FnDef {
                name: "twice".into(),
                params: vec!["x".into()],
                body: Expr::prim2(PrimOp::Mul, Expr::var("x"), Expr::int(2)),
            },
            FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::let_in(
                    "_",
                    Expr::Prim {
                        op: PrimOp::Print,
                        args: vec![Expr::int(1)],
                    },
                    Expr::call("twice", vec![Expr::int(21)]),
                ),
            },
        ],
        imports: vec![],
    };

    let (base_outcome, base_stdout) = helpers::run_single_mem(&module, ForeignRegistry::new());
    assert_eq!(base_outcome, RunOutcome::Finished(Value::Int(42)));

    for workers in [1, 2, 8] {
        for budget in [1, 3, 256] {
            let (outcome, stdout) =
                helpers::run_pooled_mem(&module, ForeignRegistry::new(), workers, budget);
            assert_eq!(outcome, base_outcome);
            assert_eq!(stdout, base_stdout);
        }
    }
}

// ============================================================================
// Fan-out stress
// ============================================================================

#[test]
fn wide_fanout_joins_every_fork() {
    let width = 24;
    let module = helpers::fanout_module(width);
    let expected = Value::Int(helpers::fanout_expected(width));

    let (outcome, _) = helpers::run_single_mem(&module, ForeignRegistry::new());
    assert_eq!(outcome, RunOutcome::Finished(expected.clone()));

    // Small budgets force many suspensions and re-leases.
    let (outcome, _) = helpers::run_pooled_mem(&module, ForeignRegistry::new(), 8, 1);
    assert_eq!(outcome, RunOutcome::Finished(expected));
}

#[test]
fn fanout_leaves_no_unresolved_futures_or_live_threads() {
    let width = 12;
    let module = helpers::fanout_module(width);
    let controller = helpers::memory_controller(&module);
    let mut driver = hark_vm::SingleThreadDriver::new(
        controller,
        ForeignRegistry::new(),
        hark_vm::RunConfig::default(),
    );
    driver.start("main", vec![]).unwrap();
    driver.run().unwrap();

    let snapshot = hark_vm::Controller::snapshot(driver.controller()).unwrap();
    assert_eq!(snapshot.threads.len(), width + 1);
    for thread in &snapshot.threads {
        assert!(thread.is_terminal(), "thread {} still live", thread.id);
    }
    for future in &snapshot.futures {
        assert!(future.resolved, "future {} unresolved", future.id);
        assert!(future.chain.is_empty(), "future {} retains waiters", future.id);
    }
}
