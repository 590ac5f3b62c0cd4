//! The thread executor: bounded stepping of one leased thread.
//!
//! A step runs entirely on the leased snapshot. Nothing escapes until the
//! controller commits: new threads and resolved futures travel in the
//! [`Outbox`], and the step's disposition travels as a [`StepOutcome`]. The
//! only controller interaction during a step is id reservation for `ACall`,
//! which allocates identifiers without creating state.
//!
//! A step ends on `Wait` over a future (resolve-or-block is decided
//! atomically at commit), on root `Return`, on budget expiry, or on a fault.

use std::mem;

use hark_types::{Fault, FunctionRef, FutureId, ThreadId, Value};

use crate::error::MachineError;
use crate::foreign::ForeignRegistry;
use crate::instr::Instr;
use crate::loader::CodeImage;
use crate::thread::{Frame, ThreadState};

/// Transactional id allocation, the one controller capability an executor
/// needs mid-step. Every [`Controller`](crate::controller::Controller)
/// implements it.
pub trait IdReserver {
    /// Reserve a fresh (thread, future) id pair without creating state.
    ///
    /// # Errors
    ///
    /// Returns a [`MachineError`] when the controller cannot allocate.
    fn reserve_pair(&self) -> Result<(ThreadId, FutureId), MachineError>;
}

/// How a step ended. Serializable because the store-backed controller
/// persists it inside the committed thread record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StepOutcome {
    /// Budget expired; the thread stays ready.
    Yield,
    /// `Wait` reached a future: block on it, or resume immediately if the
    /// controller finds it already resolved.
    Block(FutureId),
    /// The root frame returned this value.
    Finish(Value),
    /// The thread faulted.
    Fail(Fault),
}

/// A thread spawn requested by `ACall`, materialized at commit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Spawn {
    /// Reserved id for the new thread.
    pub thread: ThreadId,
    /// Reserved id for its terminal future.
    pub future: FutureId,
    /// Function to run.
    pub function: String,
    /// Arguments, already evaluated.
    pub args: Vec<Value>,
}

/// Side effects of a step, applied atomically by `commit_step`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Outbox {
    /// Threads to create.
    pub spawns: Vec<Spawn>,
    /// Futures to resolve.
    pub resolutions: Vec<(FutureId, Value)>,
    /// Lines printed during the step, in program order.
    pub prints: Vec<String>,
}

impl Outbox {
    /// Whether the step had no side effects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.resolutions.is_empty() && self.prints.is_empty()
    }
}

enum Flow {
    Continue,
    End(StepOutcome),
}

enum StepError {
    Fault(Fault),
    Machine(MachineError),
}

impl From<Fault> for StepError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl From<MachineError> for StepError {
    fn from(err: MachineError) -> Self {
        Self::Machine(err)
    }
}

/// Steps one thread against an immutable code image.
pub struct Executor<'a> {
    code: &'a CodeImage,
    foreign: &'a ForeignRegistry,
    ids: &'a (dyn IdReserver + 'a),
    budget: usize,
}

impl<'a> Executor<'a> {
    /// Create an executor with the given instruction budget (minimum 1).
    #[must_use]
    pub fn new(
        code: &'a CodeImage,
        foreign: &'a ForeignRegistry,
        ids: &'a (dyn IdReserver + 'a),
        budget: usize,
    ) -> Self {
        Self {
            code,
            foreign,
            ids,
            budget: budget.max(1),
        }
    }

    /// Advance the thread state by at most the budgeted instruction count.
    ///
    /// Faults end the step with [`StepOutcome::Fail`]; the `Err` channel is
    /// reserved for controller failures.
    ///
    /// # Errors
    ///
    /// Returns a [`MachineError`] if id reservation fails.
    pub fn step(&self, state: &mut ThreadState) -> Result<(StepOutcome, Outbox), MachineError> {
        let mut outbox = Outbox::default();
        for _ in 0..self.budget {
            let Some(instr) = self.code.instrs.get(state.ip) else {
                let fault = Fault::MalformedCode {
                    reason: format!("instruction pointer {} out of bounds", state.ip),
                };
                return Ok((StepOutcome::Fail(fault), outbox));
            };
            let instr = instr.clone();
            state.ip += 1;
            match self.exec(&instr, state, &mut outbox) {
                Ok(Flow::Continue) => {}
                Ok(Flow::End(outcome)) => return Ok((outcome, outbox)),
                Err(StepError::Fault(fault)) => return Ok((StepOutcome::Fail(fault), outbox)),
                Err(StepError::Machine(err)) => return Err(err),
            }
        }
        Ok((StepOutcome::Yield, outbox))
    }

    fn exec(
        &self,
        instr: &Instr,
        state: &mut ThreadState,
        outbox: &mut Outbox,
    ) -> Result<Flow, StepError> {
        match instr {
            Instr::PushV(name) => {
                let value = self.lookup(state, name)?;
                state.stack.push(value);
            }
            Instr::PushL(value) => state.stack.push(value.clone()),
            Instr::Bind(name) => {
                let value = pop(state)?;
                state.locals.insert(name.clone(), value);
            }
            Instr::Pop => {
                pop(state)?;
            }
            Instr::Jump { off } => jump(self.code, state, *off)?,
            Instr::JumpIfNot { off } => {
                let cond = pop(state)?;
                if !cond.truthy() {
                    jump(self.code, state, *off)?;
                }
            }
            Instr::Call { argc } => {
                let callee = pop(state)?;
                match callee {
                    Value::Function(fr) => self.enter_function(state, &fr, *argc)?,
                    Value::Foreign(fr) => self.call_foreign(state, &fr.name, fr.arity, *argc)?,
                    other => {
                        return Err(Fault::type_mismatch("callable", other.type_name()).into())
                    }
                }
            }
            Instr::CallF { argc } => {
                let callee = pop(state)?;
                match callee {
                    Value::Foreign(fr) => self.call_foreign(state, &fr.name, fr.arity, *argc)?,
                    other => {
                        return Err(
                            Fault::type_mismatch("foreign reference", other.type_name()).into()
                        )
                    }
                }
            }
            Instr::ACall { argc } => {
                let callee = pop(state)?;
                match callee {
                    Value::Function(fr) => {
                        let entry = self.code.function(&fr.name).ok_or_else(|| {
                            Fault::UndefinedFunction {
                                name: fr.name.clone(),
                            }
                        })?;
                        if entry.arity != *argc {
                            return Err(Fault::ArityMismatch {
                                name: fr.name.clone(),
                                expected: entry.arity,
                                actual: *argc,
                            }
                            .into());
                        }
                        let args = pop_args(state, *argc)?;
                        let (thread, future) = self.ids.reserve_pair()?;
                        tracing::debug!(%thread, %future, function = %fr.name, "fork");
                        outbox.spawns.push(Spawn {
                            thread,
                            future,
                            function: fr.name.clone(),
                            args,
                        });
                        state.stack.push(Value::Future(future));
                    }
                    Value::Foreign(fr) => {
                        return Err(Fault::type_mismatch(
                            "machine function for async call",
                            format!("foreign {}", fr.name),
                        )
                        .into())
                    }
                    other => {
                        return Err(Fault::type_mismatch("callable", other.type_name()).into())
                    }
                }
            }
            Instr::Wait => {
                let top = pop(state)?;
                if let Value::Future(future) = top {
                    // Resolve-or-block happens atomically at commit; the ip
                    // already points past the Wait, so the woken thread
                    // resumes with the value injected where the future was.
                    return Ok(Flow::End(StepOutcome::Block(future)));
                }
                // A Wait compiled over an already-plain value passes through.
                state.stack.push(top);
            }
            Instr::Return => {
                let ret = pop(state)?;
                match state.frames.pop() {
                    Some(frame) => {
                        state.function = frame.function;
                        state.ip = frame.ret_ip;
                        state.stack = frame.stack;
                        state.locals = frame.locals;
                        state.stack.push(ret);
                    }
                    None => return Ok(Flow::End(StepOutcome::Finish(ret))),
                }
            }
            Instr::Add => binary(state, Value::add)?,
            Instr::Sub => binary(state, Value::sub)?,
            Instr::Mul => binary(state, Value::mul)?,
            Instr::Div => binary(state, Value::div)?,
            Instr::Neg => {
                let value = pop(state)?;
                state.stack.push(value.neg()?);
            }
            Instr::Eq => {
                let b = pop(state)?;
                let a = pop(state)?;
                state.stack.push(Value::Bool(a == b));
            }
            Instr::Lt => binary(state, Value::lt)?,
            Instr::Gt => binary(state, Value::gt)?,
            Instr::And => {
                let b = pop(state)?;
                let a = pop(state)?;
                state.stack.push(Value::Bool(a.truthy() && b.truthy()));
            }
            Instr::Or => {
                let b = pop(state)?;
                let a = pop(state)?;
                state.stack.push(Value::Bool(a.truthy() || b.truthy()));
            }
            Instr::Not => {
                let value = pop(state)?;
                state.stack.push(Value::Bool(!value.truthy()));
            }
            Instr::ListNew { len } => {
                let items = pop_args(state, *len)?;
                state.stack.push(Value::List(items));
            }
            Instr::ListGet => {
                let index = pop(state)?;
                let list = pop_list(state)?;
                let i = match index {
                    Value::Int(i) => i,
                    other => {
                        return Err(
                            Fault::type_mismatch("integer index", other.type_name()).into()
                        )
                    }
                };
                let item = usize::try_from(i)
                    .ok()
                    .and_then(|i| list.get(i))
                    .ok_or_else(|| {
                        Fault::type_mismatch(
                            format!("index below {}", list.len()),
                            format!("index {i}"),
                        )
                    })?;
                state.stack.push(item.clone());
            }
            Instr::First => {
                let list = pop_list(state)?;
                let head = list.first().ok_or_else(|| {
                    Fault::type_mismatch("non-empty list", "empty list")
                })?;
                state.stack.push(head.clone());
            }
            Instr::Rest => {
                let mut list = pop_list(state)?;
                if list.is_empty() {
                    return Err(Fault::type_mismatch("non-empty list", "empty list").into());
                }
                list.remove(0);
                state.stack.push(Value::List(list));
            }
            Instr::Append => {
                let item = pop(state)?;
                let mut list = pop_list(state)?;
                list.push(item);
                state.stack.push(Value::List(list));
            }
            Instr::RecordNew { len } => {
                let mut fields = std::collections::BTreeMap::new();
                for _ in 0..*len {
                    let value = pop(state)?;
                    let name = match pop(state)? {
                        Value::Symbol(name) => name,
                        other => {
                            return Err(
                                Fault::type_mismatch("symbol key", other.type_name()).into()
                            )
                        }
                    };
                    fields.insert(name, value);
                }
                state.stack.push(Value::Record(fields));
            }
            Instr::RecordGet => {
                let key = pop(state)?;
                let record = pop(state)?;
                let name = match key {
                    Value::Symbol(name) => name,
                    other => {
                        return Err(Fault::type_mismatch("symbol key", other.type_name()).into())
                    }
                };
                let fields = match record {
                    Value::Record(fields) => fields,
                    other => {
                        return Err(Fault::type_mismatch("record", other.type_name()).into())
                    }
                };
                let value = fields
                    .get(&name)
                    .ok_or(Fault::UnboundName { name })?;
                state.stack.push(value.clone());
            }
            Instr::Print => {
                let top = state.stack.last().ok_or_else(|| Fault::MalformedCode {
                    reason: "operand stack underflow".into(),
                })?;
                outbox.prints.push(top.to_string());
            }
        }
        Ok(Flow::Continue)
    }

    /// Name resolution: local bindings, then functions, then foreigns.
    fn lookup(&self, state: &ThreadState, name: &str) -> Result<Value, Fault> {
        if let Some(value) = state.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(entry) = self.code.function(name) {
            return Ok(Value::Function(FunctionRef {
                name: name.to_string(),
                arity: entry.arity,
            }));
        }
        if let Some(decl) = self.code.foreigns.get(name) {
            return Ok(Value::Foreign(hark_types::ForeignRef {
                name: decl.target.clone(),
                arity: decl.arity,
            }));
        }
        Err(Fault::UnboundName {
            name: name.to_string(),
        })
    }

    /// Push an activation frame and jump to the callee's entry.
    fn enter_function(
        &self,
        state: &mut ThreadState,
        fr: &FunctionRef,
        argc: usize,
    ) -> Result<(), Fault> {
        let entry = self
            .code
            .function(&fr.name)
            .ok_or_else(|| Fault::UndefinedFunction {
                name: fr.name.clone(),
            })?;
        if entry.arity != argc {
            return Err(Fault::ArityMismatch {
                name: fr.name.clone(),
                expected: entry.arity,
                actual: argc,
            });
        }
        let args = pop_args(state, argc)?;
        let params = entry.params.clone();
        let target = entry.entry;

        let frame = Frame {
            function: mem::replace(&mut state.function, fr.name.clone()),
            ret_ip: state.ip,
            stack: mem::take(&mut state.stack),
            locals: mem::take(&mut state.locals),
        };
        state.frames.push(frame);
        state.locals = params.into_iter().zip(args).collect();
        state.ip = target;
        Ok(())
    }

    /// Run a host procedure synchronously and push its result.
    fn call_foreign(
        &self,
        state: &mut ThreadState,
        name: &str,
        declared: usize,
        argc: usize,
    ) -> Result<(), Fault> {
        if declared != argc {
            return Err(Fault::ArityMismatch {
                name: name.to_string(),
                expected: declared,
                actual: argc,
            });
        }
        let args = pop_args(state, argc)?;
        tracing::trace!(name, argc, "foreign call");
        let result = self.foreign.call(name, &args)?;
        state.stack.push(result);
        Ok(())
    }
}

fn pop(state: &mut ThreadState) -> Result<Value, Fault> {
    state.stack.pop().ok_or_else(|| Fault::MalformedCode {
        reason: "operand stack underflow".into(),
    })
}

/// Pop `argc` values preserving their push order.
fn pop_args(state: &mut ThreadState, argc: usize) -> Result<Vec<Value>, Fault> {
    if state.stack.len() < argc {
        return Err(Fault::MalformedCode {
            reason: "operand stack underflow".into(),
        });
    }
    Ok(state.stack.split_off(state.stack.len() - argc))
}

fn pop_list(state: &mut ThreadState) -> Result<Vec<Value>, Fault> {
    match pop(state)? {
        Value::List(items) => Ok(items),
        other => Err(Fault::type_mismatch("list", other.type_name())),
    }
}

fn binary(
    state: &mut ThreadState,
    op: fn(&Value, &Value) -> Result<Value, Fault>,
) -> Result<(), Fault> {
    let b = pop(state)?;
    let a = pop(state)?;
    state.stack.push(op(&a, &b)?);
    Ok(())
}

fn jump(code: &CodeImage, state: &mut ThreadState, off: i32) -> Result<(), Fault> {
    let target = state.ip as i64 + i64::from(off);
    if target < 0 || target >= code.instrs.len() as i64 {
        return Err(Fault::MalformedCode {
            reason: format!("jump to {target}, outside 0..{}", code.instrs.len()),
        });
    }
    state.ip = target as usize;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use hark_types::{Expr, FnDef, Module, PrimOp};
    use std::cell::Cell;

    struct SeqIds(Cell<u64>);

    impl SeqIds {
        fn new() -> Self {
            Self(Cell::new(1))
        }
    }

    impl IdReserver for SeqIds {
        fn reserve_pair(&self) -> Result<(ThreadId, FutureId), MachineError> {
            let n = self.0.get();
            self.0.set(n + 1);
            Ok((ThreadId(n), FutureId(n)))
        }
    }

    fn state_at(image: &CodeImage, function: &str) -> ThreadState {
        let entry = image.function(function).unwrap();
        ThreadState {
            function: function.to_string(),
            ip: entry.entry,
            stack: Vec::new(),
            locals: Default::default(),
            frames: Vec::new(),
        }
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

    fn run_main(image: &CodeImage, budget: usize) -> (StepOutcome, Outbox) {
        let foreign = ForeignRegistry::new();
        let ids = SeqIds::new();
        let executor = Executor::new(image, &foreign, &ids, budget);
        let mut state = state_at(image, "main");
        executor.step(&mut state).unwrap()
    }

    #[test]
    fn arithmetic_finishes() {
        let image = compile(&main_module(Expr::prim2(
            PrimOp::Add,
            Expr::int(1),
            Expr::int(2),
        )))
        .unwrap();
        let (outcome, outbox) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(3)));
        assert!(outbox.is_empty());
    }

    #[test]
    fn budget_expiry_yields() {
        let image = compile(&main_module(Expr::prim2(
            PrimOp::Add,
            Expr::int(1),
            Expr::int(2),
        )))
        .unwrap();
        let (outcome, _) = run_main(&image, 2);
        assert_eq!(outcome, StepOutcome::Yield);
    }

    #[test]
    fn call_pushes_and_pops_frames() {
        let module = Module {
            functions: vec![
                FnDef {
                    name: "inc".into(),
                    params: vec!["x".into()],
                    body: Expr::prim2(PrimOp::Add, Expr::var("x"), Expr::int(1)),
                },
                FnDef {
                    name: "main".into(),
                    params: vec![],
                    body: Expr::call("inc", vec![Expr::int(41)]),
                },
            ],
            imports: vec![],
        };
        let image = compile(&module).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(42)));
    }

    #[test]
    fn wait_on_future_blocks_after_popping_it() {
        let image = compile(&main_module(Expr::await_(Expr::Literal(Value::Future(
            FutureId(9),
        )))))
        .unwrap();
        let foreign = ForeignRegistry::new();
        let ids = SeqIds::new();
        let executor = Executor::new(&image, &foreign, &ids, 100);
        let mut state = state_at(&image, "main");
        let (outcome, _) = executor.step(&mut state).unwrap();
        assert_eq!(outcome, StepOutcome::Block(FutureId(9)));
        assert!(state.stack.is_empty());
        // The ip points past the Wait: resumption continues with the
        // injected value.
        assert!(matches!(image.instrs[state.ip], Instr::Return));
    }

    #[test]
    fn wait_on_plain_value_passes_through() {
        let image = compile(&main_module(Expr::await_(Expr::int(7)))).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(7)));
    }

    #[test]
    fn acall_spawns_and_pushes_future() {
        let module = Module {
            functions: vec![
                FnDef {
                    name: "task".into(),
                    params: vec!["x".into()],
                    body: Expr::var("x"),
                },
                FnDef {
                    name: "main".into(),
                    params: vec![],
                    body: Expr::async_call("task", vec![Expr::int(5)]),
                },
            ],
            imports: vec![],
        };
        let image = compile(&module).unwrap();
        let (outcome, outbox) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Future(FutureId(1))));
        assert_eq!(
            outbox.spawns,
            vec![Spawn {
                thread: ThreadId(1),
                future: FutureId(1),
                function: "task".into(),
                args: vec![Value::Int(5)],
            }]
        );
    }

    #[test]
    fn acall_of_foreign_ref_faults() {
        let image = CodeImage {
            instrs: vec![
                Instr::PushL(Value::Foreign(hark_types::ForeignRef {
                    name: "host/rs".into(),
                    arity: 0,
                })),
                Instr::ACall { argc: 0 },
                Instr::Return,
            ],
            functions: {
                let mut m = std::collections::BTreeMap::new();
                m.insert(
                    "main".to_string(),
                    crate::loader::FnEntry {
                        entry: 0,
                        arity: 0,
                        params: vec![],
                    },
                );
                m
            },
            foreigns: Default::default(),
        };
        let (outcome, _) = run_main(&image, 100);
        assert_matches::assert_matches!(
            outcome,
            StepOutcome::Fail(Fault::TypeMismatch { .. })
        );
    }

    #[test]
    fn calling_a_non_function_faults() {
        let image = compile(&main_module(Expr::Call {
            callee: Box::new(Expr::int(3)),
            args: vec![],
        }))
        .unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_matches::assert_matches!(
            outcome,
            StepOutcome::Fail(Fault::TypeMismatch { .. })
        );
    }

    #[test]
    fn division_by_zero_faults() {
        let image = compile(&main_module(Expr::prim2(
            PrimOp::Div,
            Expr::int(1),
            Expr::int(0),
        )))
        .unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Fail(Fault::DivisionByZero));
    }

    #[test]
    fn unbound_name_faults() {
        let image = compile(&main_module(Expr::var("nope"))).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(
            outcome,
            StepOutcome::Fail(Fault::UnboundName {
                name: "nope".into()
            })
        );
    }

    #[test]
    fn wrong_arity_call_faults() {
        let module = Module {
            functions: vec![
                FnDef {
                    name: "one".into(),
                    params: vec!["x".into()],
                    body: Expr::var("x"),
                },
                FnDef {
                    name: "main".into(),
                    params: vec![],
                    body: Expr::call("one", vec![]),
                },
            ],
            imports: vec![],
        };
        let image = compile(&module).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(
            outcome,
            StepOutcome::Fail(Fault::ArityMismatch {
                name: "one".into(),
                expected: 1,
                actual: 0,
            })
        );
    }

    #[test]
    fn foreign_call_runs_within_the_step() {
        let module = Module {
            functions: vec![FnDef {
                name: "main".into(),
                params: vec![],
                body: Expr::call("rs", vec![Expr::int(2), Expr::int(3)]),
            }],
            imports: vec![hark_types::Import {
                name: "rs".into(),
                target: "host/add".into(),
                arity: 2,
            }],
        };
        let image = compile(&module).unwrap();
        let mut foreign = ForeignRegistry::new();
        foreign.register("host/add", 2, |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => Err("expected integers".into()),
        });
        let ids = SeqIds::new();
        let executor = Executor::new(&image, &foreign, &ids, 100);
        let mut state = state_at(&image, "main");
        let (outcome, _) = executor.step(&mut state).unwrap();
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(5)));
    }

    #[test]
    fn print_leaves_value_and_records_line() {
        let image = compile(&main_module(Expr::Prim {
            op: PrimOp::Print,
            args: vec![Expr::int(7)],
        }))
        .unwrap();
        let (outcome, outbox) = run_main(&image, 100);
        // print evaluates to the printed value.
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(7)));
        assert_eq!(outbox.prints, vec!["7".to_string()]);
    }

    #[test]
    fn list_and_record_ops() {
        // first(rest([1, 2, 3])) == 2
        let body = Expr::Prim {
            op: PrimOp::First,
            args: vec![Expr::Prim {
                op: PrimOp::Rest,
                args: vec![Expr::Prim {
                    op: PrimOp::ListNew,
                    args: vec![Expr::int(1), Expr::int(2), Expr::int(3)],
                }],
            }],
        };
        let image = compile(&main_module(body)).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(2)));

        // { x: 10 }.x == 10
        let body = Expr::prim2(
            PrimOp::RecordGet,
            Expr::Prim {
                op: PrimOp::RecordNew,
                args: vec![Expr::Literal(Value::Symbol("x".into())), Expr::int(10)],
            },
            Expr::Literal(Value::Symbol("x".into())),
        );
        let image = compile(&main_module(body)).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(10)));
    }

    #[test]
    fn record_missing_field_is_unbound() {
        let body = Expr::prim2(
            PrimOp::RecordGet,
            Expr::Prim {
                op: PrimOp::RecordNew,
                args: vec![],
            },
            Expr::Literal(Value::Symbol("y".into())),
        );
        let image = compile(&main_module(body)).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(
            outcome,
            StepOutcome::Fail(Fault::UnboundName { name: "y".into() })
        );
    }

    #[test]
    fn conditional_takes_the_falsy_branch() {
        let body = Expr::If {
            cond: Box::new(Expr::Literal(Value::Bool(false))),
            then_branch: Box::new(Expr::int(1)),
            else_branch: Box::new(Expr::int(2)),
        };
        let image = compile(&main_module(body)).unwrap();
        let (outcome, _) = run_main(&image, 100);
        assert_eq!(outcome, StepOutcome::Finish(Value::Int(2)));
    }
}
