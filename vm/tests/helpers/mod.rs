//! Shared fixtures: scenario programs and run harnesses.

use hark_types::{Expr, FnDef, Import, Module, PrimOp, Value};
use hark_vm::{
    compiler, ControllerConfig, ForeignRegistry, MemoryController, MemoryStore, PooledDriver,
    RunConfig, RunOutcome, SingleThreadDriver, StoreController,
};

/// `fn main(){ 1 + 2 }`
pub fn arith_module() -> Module {
    main_module(Expr::prim2(PrimOp::Add, Expr::int(1), Expr::int(2)))
}

/// `fn main(){ x = 5; x + 1 }`
pub fn let_module() -> Module {
    main_module(Expr::let_in(
        "x",
        Expr::int(5),
        Expr::prim2(PrimOp::Add, Expr::var("x"), Expr::int(1)),
    ))
}

/// `fn a(x){x+1} fn main(){ a(41) }`
pub fn call_module() -> Module {
    Module {
        functions: vec![
            FnDef {
                name: "a".into(),
                params: vec!["x".into()],
                body: Expr::prim2(PrimOp::Add, Expr::var("x"), Expr::int(1)),
            },
            FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::call("a", vec![Expr::int(41)]),
            },
        ],
        imports: vec![],
    }
}

/// `fn b(x){x*1000} fn d(x){x*10}
///  fn main(){ p=async b(5); q=async d(5); await p + await q }`
pub fn fork_join_module() -> Module {
    Module {
        functions: vec![
            FnDef {
                name: "b".into(),
                params: vec!["x".into()],
                body: Expr::prim2(PrimOp::Mul, Expr::var("x"), Expr::int(1000)),
            },
            FnDef {
                name: "d".into(),
                params: vec!["x".into()],
                body: Expr::prim2(PrimOp::Mul, Expr::var("x"), Expr::int(10)),
            },
            FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::let_in(
                    "p",
                    Expr::async_call("b", vec![Expr::int(5)]),
                    Expr::let_in(
                        "q",
                        Expr::async_call("d", vec![Expr::int(5)]),
                        Expr::prim2(
                            PrimOp::Add,
                            Expr::await_(Expr::var("p")),
                            Expr::await_(Expr::var("q")),
                        ),
                    ),
                ),
            },
        ],
        imports: vec![],
    }
}

/// The README program with `rs` pinned to return 0:
///
/// `fn slow_inc(x){ rs(x,0); 1000*(x+1) }`
/// `fn slow_dec(x){ rs(x,1); 10*(x-1) }`
/// `fn concurrent(x){ p=async slow_inc(x); q=async slow_dec(x);
///   await p + await q * -1 }`
///
/// Standard precedence, left to right: `(await p) + ((await q) * -1)`.
pub fn readme_module() -> Module {
    let slow_inc = FnDef {
        name: "slow_inc".into(),
        params: vec!["x".into()],
        body: Expr::let_in(
            "_",
            Expr::call("rs", vec![Expr::var("x"), Expr::int(0)]),
            Expr::prim2(
                PrimOp::Mul,
                Expr::int(1000),
                Expr::prim2(PrimOp::Add, Expr::var("x"), Expr::int(1)),
            ),
        ),
    };
    let slow_dec = FnDef {
        name: "slow_dec".into(),
        params: vec!["x".into()],
        body: Expr::let_in(
            "_",
            Expr::call("rs", vec![Expr::var("x"), Expr::int(1)]),
            Expr::prim2(
                PrimOp::Mul,
                Expr::int(10),
                Expr::prim2(PrimOp::Sub, Expr::var("x"), Expr::int(1)),
            ),
        ),
    };
    let concurrent = FnDef {
        name: "concurrent".into(),
        params: vec!["x".into()],
        body: Expr::let_in(
            "p",
            Expr::async_call("slow_inc", vec![Expr::var("x")]),
            Expr::let_in(
                "q",
                Expr::async_call("slow_dec", vec![Expr::var("x")]),
                Expr::prim2(
                    PrimOp::Add,
                    Expr::await_(Expr::var("p")),
                    Expr::prim2(
                        PrimOp::Mul,
                        Expr::await_(Expr::var("q")),
                        Expr::int(-1),
                    ),
                ),
            ),
        ),
    };
    let main = FnDef {
        name: "main".into(),
        params: vec![],
        body: Expr::call("concurrent", vec![Expr::int(5)]),
    };
    Module {
        functions: vec![slow_inc, slow_dec, concurrent, main],
        imports: vec![Import {
            name: "rs".into(),
            target: "pysrc.main/random_sleep".into(),
            arity: 2,
        }],
    }
}

/// `fn loop_err(){ 1/0 } fn main(){ p = async loop_err(); await p + 1 }`
pub fn error_module() -> Module {
    Module {
        functions: vec![
            FnDef {
                name: "loop_err".into(),
                params: vec![],
                body: Expr::prim2(PrimOp::Div, Expr::int(1), Expr::int(0)),
            },
            FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::let_in(
                    "p",
                    Expr::async_call("loop_err", vec![]),
                    Expr::prim2(PrimOp::Add, Expr::await_(Expr::var("p")), Expr::int(1)),
                ),
            },
        ],
        imports: vec![],
    }
}

/// `fn work(x){x*2}` plus a main that forks `width` workers and sums their
/// awaited results. Expected value: `2 * (0 + 1 + ... + width-1)`.
pub fn fanout_module(width: usize) -> Module {
    let work = FnDef {
        name: "work".into(),
        params: vec!["x".into()],
        body: Expr::prim2(PrimOp::Mul, Expr::var("x"), Expr::int(2)),
    };

    let mut sum = Expr::await_(Expr::var("p0"));
    for i in 1..width {
        sum = Expr::prim2(PrimOp::Add, sum, Expr::await_(Expr::var(format!("p{i}"))));
    }
    let mut body = sum;
    for i in (0..width).rev() {
        body = Expr::let_in(
            format!("p{i}"),
            Expr::async_call("work", vec![Expr::int(i as i64)]),
            body,
        );
    }

    Module {
        functions: vec![
            work,
            FnDef {
                name: "main".into(),
                params: vec![],
                body,
            },
        ],
        imports: vec![],
    }
}

pub fn fanout_expected(width: usize) -> i64 {
    (0..width as i64).map(|i| i * 2).sum()
}

/// Foreign registry with `rs(a,b)` pinned to return 0.
pub fn rs_registry() -> ForeignRegistry {
    let mut registry = ForeignRegistry::new();
    registry.register("pysrc.main/random_sleep", 2, |_args| Ok(Value::Int(0)));
    registry
}

pub fn memory_controller(module: &Module) -> MemoryController {
    let image = compiler::compile(module).expect("module compiles");
    MemoryController::new(image, ControllerConfig::default()).expect("image validates")
}

pub fn store_controller(module: &Module) -> StoreController<MemoryStore> {
    let image = compiler::compile(module).expect("module compiles");
    StoreController::open(
        MemoryStore::new(),
        "test-session",
        image,
        ControllerConfig::default(),
    )
    .expect("image validates")
}

pub fn run_single_mem(
    module: &Module,
    foreign: ForeignRegistry,
) -> (RunOutcome, Vec<String>) {
    let mut driver =
        SingleThreadDriver::new(memory_controller(module), foreign, RunConfig::default());
    let outcome = driver.run_program("main", vec![]).expect("run completes");
    let stdout = driver.stdout().expect("stdout readable");
    (outcome, stdout)
}

pub fn run_single_store(
    module: &Module,
    foreign: ForeignRegistry,
) -> (RunOutcome, Vec<String>) {
    let mut driver =
        SingleThreadDriver::new(store_controller(module), foreign, RunConfig::default());
    let outcome = driver.run_program("main", vec![]).expect("run completes");
    let stdout = driver.stdout().expect("stdout readable");
    (outcome, stdout)
}

pub fn run_pooled_mem(
    module: &Module,
    foreign: ForeignRegistry,
    workers: usize,
    step_budget: usize,
) -> (RunOutcome, Vec<String>) {
    let config = RunConfig {
        workers,
        step_budget,
        ..RunConfig::default()
    };
    let mut driver = PooledDriver::new(memory_controller(module), foreign, config);
    driver.start("main", vec![]).expect("start");
    let outcome = driver.run().expect("run completes");
    let stdout = driver.stdout().expect("stdout readable");
    (outcome, stdout)
}

pub fn run_pooled_store(
    module: &Module,
    foreign: ForeignRegistry,
    workers: usize,
    step_budget: usize,
) -> (RunOutcome, Vec<String>) {
    let config = RunConfig {
        workers,
        step_budget,
        ..RunConfig::default()
    };
    let mut driver = PooledDriver::new(store_controller(module), foreign, config);
    driver.start("main", vec![]).expect("start");
    let outcome = driver.run().expect("run completes");
    let stdout = driver.stdout().expect("stdout readable");
    (outcome, stdout)
}

fn main_module(body: Expr) -> Module {
    Module {
        functions: vec![FnDef {
            name: "main".into(),
            params: vec![],
            body,
        }],
        imports: vec![],
    }
}
