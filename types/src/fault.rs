//! User-level faults and the distinguished error value.
//!
//! A fault describes why a thread stopped abnormally. Faults are ordinary
//! data: when a thread errors, its terminal future is resolved with a
//! [`Value::Error`](crate::value::Value::Error) carrying an [`ErrorSignal`],
//! so awaiters unblock and the error propagates through `await`.
//!
//! Controller-level conditions (lease loss, double resolution, store
//! unavailability) are not faults — they live in the machine crate's error
//! type and never reach program code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ThreadId;

/// Why a thread errored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// An operand had the wrong variant.
    TypeMismatch {
        /// What the operation required.
        expected: String,
        /// What was actually on the stack.
        actual: String,
    },
    /// A call supplied the wrong number of arguments.
    ArityMismatch {
        /// Callee name.
        name: String,
        /// Declared arity.
        expected: usize,
        /// Arguments supplied.
        actual: usize,
    },
    /// A name was neither locally bound nor a known function.
    UnboundName {
        /// The unresolved name.
        name: String,
    },
    /// A function reference points at nothing in the code image.
    UndefinedFunction {
        /// The missing function name.
        name: String,
    },
    /// Division with a zero divisor.
    DivisionByZero,
    /// A host procedure failed.
    ForeignError {
        /// Qualified name of the host procedure.
        name: String,
        /// Host-supplied reason.
        reason: String,
    },
    /// The instruction stream itself was inconsistent at runtime.
    MalformedCode {
        /// Description of the inconsistency.
        reason: String,
    },
}

impl Fault {
    /// Build a type-mismatch fault from the two descriptions.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
            Self::ArityMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "arity mismatch: {name} takes {expected} argument(s), got {actual}"
            ),
            Self::UnboundName { name } => write!(f, "unbound name: {name}"),
            Self::UndefinedFunction { name } => write!(f, "undefined function: {name}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::ForeignError { name, reason } => {
                write!(f, "foreign call {name} failed: {reason}")
            }
            Self::MalformedCode { reason } => write!(f, "malformed code: {reason}"),
        }
    }
}

/// The payload of a distinguished error value.
///
/// `origin` is the thread where the fault first occurred; `path` records the
/// threads the signal travelled through (origin first), so the program
/// outcome can report the first-origin reason with its propagation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSignal {
    /// The originating fault.
    pub fault: Fault,
    /// Thread where the fault occurred.
    pub origin: ThreadId,
    /// Threads the signal propagated through, origin first.
    pub path: Vec<ThreadId>,
}

impl ErrorSignal {
    /// Signal a fresh fault at its origin thread.
    #[must_use]
    pub fn new(fault: Fault, origin: ThreadId) -> Self {
        Self {
            fault,
            origin,
            path: vec![origin],
        }
    }

    /// Extend the propagation path with a thread the signal flowed through.
    #[must_use]
    pub fn via(mut self, hop: ThreadId) -> Self {
        if self.path.last() != Some(&hop) {
            self.path.push(hop);
        }
        self
    }
}

impl fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (origin {}", self.fault, self.origin)?;
        if self.path.len() > 1 {
            write!(f, ", via ")?;
            for (i, hop) in self.path.iter().enumerate() {
                if i > 0 {
                    write!(f, " -> ")?;
                }
                write!(f, "{hop}")?;
            }
        }
        write!(f, ")")
    }
}
