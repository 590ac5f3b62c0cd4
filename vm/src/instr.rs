//! The abstract machine instruction set.
//!
//! Instructions operate on a per-thread operand stack and local bindings.
//! Jump offsets are relative and are applied *after* the instruction pointer
//! has already advanced past the jump, so `off: 0` is a plain fall-through.

use serde::{Deserialize, Serialize};

use hark_types::Value;

/// A machine instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Push the value bound to a name: local bindings first, then the
    /// function table, then the foreign table.
    PushV(String),
    /// Push a literal value.
    PushL(Value),
    /// Pop the top of stack and bind it to a name in the current frame.
    Bind(String),
    /// Discard the top of stack.
    Pop,
    /// Unconditional relative jump.
    Jump {
        /// Offset from the already-advanced instruction pointer.
        off: i32,
    },
    /// Pop a value; jump if it is falsy.
    JumpIfNot {
        /// Offset from the already-advanced instruction pointer.
        off: i32,
    },
    /// Synchronous call: pops the callee, then `argc` arguments.
    Call {
        /// Argument count.
        argc: usize,
    },
    /// Foreign call: pops a foreign reference, then `argc` arguments; the
    /// host procedure runs to completion within the step.
    CallF {
        /// Argument count.
        argc: usize,
    },
    /// Asynchronous call: pops the callee and `argc` arguments, spawns a
    /// thread, and pushes a fresh future. The caller continues immediately.
    ACall {
        /// Argument count.
        argc: usize,
    },
    /// If the top of stack is a future, end the step and resolve-or-block on
    /// it; any other value passes through untouched.
    Wait,
    /// Return from the current frame; from the root frame, finish the thread.
    Return,
    /// Pop two numbers, push their sum.
    Add,
    /// Pop two numbers, push their difference.
    Sub,
    /// Pop two numbers, push their product.
    Mul,
    /// Pop two numbers, push their quotient; zero divisor faults.
    Div,
    /// Negate the top number.
    Neg,
    /// Pop two values, push structural equality.
    Eq,
    /// Pop two numbers, push less-than.
    Lt,
    /// Pop two numbers, push greater-than.
    Gt,
    /// Pop two values, push conjunction of their truthiness.
    And,
    /// Pop two values, push disjunction of their truthiness.
    Or,
    /// Pop a value, push negation of its truthiness.
    Not,
    /// Pop `len` values, push them as a list in evaluation order.
    ListNew {
        /// Element count.
        len: usize,
    },
    /// Pop an index, then a list; push the element.
    ListGet,
    /// Pop a non-empty list, push its head.
    First,
    /// Pop a non-empty list, push its tail.
    Rest,
    /// Pop an element, then a list; push the list with the element appended.
    Append,
    /// Pop `len` key/value pairs (key pushed first), push a record.
    RecordNew {
        /// Pair count.
        len: usize,
    },
    /// Pop a symbol, then a record; push the field value.
    RecordGet,
    /// Print the top of stack in canonical form, leaving it in place.
    Print,
}
