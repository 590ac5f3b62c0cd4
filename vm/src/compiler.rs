//! Compile a checked program tree to a code image.
//!
//! Every function becomes a contiguous instruction block ending in `Return`.
//! Expressions compile in stack discipline with left-to-right evaluation —
//! source order is observable through `print` and foreign calls, so the
//! compiler never reorders operands. Forward jumps are emitted as
//! placeholders and patched once the target index is known.

use std::collections::BTreeMap;

use hark_types::{Expr, Module, PrimOp};

use crate::instr::Instr;
use crate::loader::{CodeImage, FnEntry, ForeignDecl};

/// Errors from compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Two functions share a name.
    #[error("duplicate function {name}")]
    DuplicateFunction {
        /// The repeated name.
        name: String,
    },
    /// Two imports share a name, or an import shadows a function.
    #[error("conflicting import {name}")]
    ConflictingImport {
        /// The conflicting name.
        name: String,
    },
    /// A fixed-arity primitive got the wrong operand count.
    #[error("{op:?} takes {expected} operand(s), got {actual}")]
    PrimArity {
        /// The primitive.
        op: PrimOp,
        /// Its fixed arity.
        expected: usize,
        /// Operands supplied.
        actual: usize,
    },
    /// A record constructor got an odd operand count.
    #[error("record constructor needs key/value pairs, got {count} operand(s)")]
    UnpairedRecord {
        /// Operands supplied.
        count: usize,
    },
    /// `async` applied to a foreign binding — foreigns are synchronous.
    #[error("cannot spawn foreign function {name}")]
    AsyncForeign {
        /// The foreign name.
        name: String,
    },
}

/// Compile a module into a code image.
///
/// # Errors
///
/// Returns a [`CompileError`] on name conflicts, primitive arity
/// violations, or `async` application of a foreign binding.
pub fn compile(module: &Module) -> Result<CodeImage, CompileError> {
    let mut image = CodeImage::default();

    for import in &module.imports {
        let conflict = image.foreigns.contains_key(&import.name)
            || module.function(&import.name).is_some();
        if conflict {
            return Err(CompileError::ConflictingImport {
                name: import.name.clone(),
            });
        }
        image.foreigns.insert(
            import.name.clone(),
            ForeignDecl {
                target: import.target.clone(),
                arity: import.arity,
            },
        );
    }

    for def in &module.functions {
        if image.functions.contains_key(&def.name) {
            return Err(CompileError::DuplicateFunction {
                name: def.name.clone(),
            });
        }
        image.functions.insert(
            def.name.clone(),
            FnEntry {
                entry: image.instrs.len(),
                arity: def.params.len(),
                params: def.params.clone(),
            },
        );
        compile_expr(&def.body, &image.foreigns, &mut image.instrs)?;
        image.instrs.push(Instr::Return);
    }

    Ok(image)
}

/// Whether a callee expression statically names a foreign binding.
fn foreign_callee<'e>(
    callee: &'e Expr,
    foreigns: &BTreeMap<String, ForeignDecl>,
) -> Option<&'e str> {
    match callee {
        Expr::Var(name) if foreigns.contains_key(name) => Some(name),
        _ => None,
    }
}

fn compile_expr(
    expr: &Expr,
    foreigns: &BTreeMap<String, ForeignDecl>,
    instrs: &mut Vec<Instr>,
) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(value) => instrs.push(Instr::PushL(value.clone())),
        Expr::Var(name) => instrs.push(Instr::PushV(name.clone())),
        Expr::Let { name, value, body } => {
            compile_expr(value, foreigns, instrs)?;
            instrs.push(Instr::Bind(name.clone()));
            compile_expr(body, foreigns, instrs)?;
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            compile_expr(cond, foreigns, instrs)?;
            let to_else = instrs.len();
            instrs.push(Instr::JumpIfNot { off: 0 });
            compile_expr(then_branch, foreigns, instrs)?;
            let to_end = instrs.len();
            instrs.push(Instr::Jump { off: 0 });
            patch_jump(instrs, to_else);
            compile_expr(else_branch, foreigns, instrs)?;
            patch_jump(instrs, to_end);
        }
        Expr::Call { callee, args } => {
            for arg in args {
                compile_expr(arg, foreigns, instrs)?;
            }
            compile_expr(callee, foreigns, instrs)?;
            if foreign_callee(callee, foreigns).is_some() {
                instrs.push(Instr::CallF { argc: args.len() });
            } else {
                instrs.push(Instr::Call { argc: args.len() });
            }
        }
        Expr::AsyncCall { callee, args } => {
            if let Some(name) = foreign_callee(callee, foreigns) {
                return Err(CompileError::AsyncForeign {
                    name: name.to_string(),
                });
            }
            for arg in args {
                compile_expr(arg, foreigns, instrs)?;
            }
            compile_expr(callee, foreigns, instrs)?;
            instrs.push(Instr::ACall { argc: args.len() });
        }
        Expr::Await(inner) => {
            compile_expr(inner, foreigns, instrs)?;
            instrs.push(Instr::Wait);
        }
        Expr::Prim { op, args } => {
            if let Some(expected) = op.arity() {
                if args.len() != expected {
                    return Err(CompileError::PrimArity {
                        op: *op,
                        expected,
                        actual: args.len(),
                    });
                }
            }
            if *op == PrimOp::RecordNew && args.len() % 2 != 0 {
                return Err(CompileError::UnpairedRecord { count: args.len() });
            }
            for arg in args {
                compile_expr(arg, foreigns, instrs)?;
            }
            instrs.push(prim_instr(*op, args.len()));
        }
    }
    Ok(())
}

/// Patch a placeholder jump at `at` to land on the current end of `instrs`.
fn patch_jump(instrs: &mut Vec<Instr>, at: usize) {
    let off = (instrs.len() - (at + 1)) as i32;
    match &mut instrs[at] {
        Instr::Jump { off: slot } | Instr::JumpIfNot { off: slot } => *slot = off,
        other => unreachable!("patch target is not a jump: {other:?}"),
    }
}

fn prim_instr(op: PrimOp, argc: usize) -> Instr {
    match op {
        PrimOp::Add => Instr::Add,
        PrimOp::Sub => Instr::Sub,
        PrimOp::Mul => Instr::Mul,
        PrimOp::Div => Instr::Div,
        PrimOp::Neg => Instr::Neg,
        PrimOp::Eq => Instr::Eq,
        PrimOp::Lt => Instr::Lt,
        PrimOp::Gt => Instr::Gt,
        PrimOp::And => Instr::And,
        PrimOp::Or => Instr::Or,
        PrimOp::Not => Instr::Not,
        PrimOp::ListNew => Instr::ListNew { len: argc },
        PrimOp::ListGet => Instr::ListGet,
        PrimOp::First => Instr::First,
        PrimOp::Rest => Instr::Rest,
        PrimOp::Append => Instr::Append,
        PrimOp::RecordNew => Instr::RecordNew { len: argc / 2 },
        PrimOp::RecordGet => Instr::RecordGet,
        PrimOp::Print => Instr::Print,
    }
}
