//! Threads: lightweight, externally resumable interpreter states.
//!
//! A thread is a plain data record. Its whole execution state — operand
//! stack, local bindings, instruction pointer, and call chain — serializes,
//! so a suspended thread can resume on any worker attached to the same
//! controller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hark_types::{ErrorSignal, FutureId, ThreadId, Value};

/// An activation record: the caller state captured by `Call` and consumed by
/// `Return`. Frames are never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Function the caller was executing.
    pub function: String,
    /// Instruction pointer to resume the caller at.
    pub ret_ip: usize,
    /// The caller's operand stack.
    pub stack: Vec<Value>,
    /// The caller's local bindings.
    pub locals: BTreeMap<String, Value>,
}

/// The resumable portion of a thread: everything an executor needs to step
/// it. This is what a lease carries and what `commit_step` writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadState {
    /// Function currently executing.
    pub function: String,
    /// Instruction pointer into the code image.
    pub ip: usize,
    /// Operand stack.
    pub stack: Vec<Value>,
    /// Local bindings of the current frame.
    pub locals: BTreeMap<String, Value>,
    /// Caller frames, innermost last.
    pub frames: Vec<Frame>,
}

/// Thread lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    /// Schedulable.
    Ready,
    /// Leased to exactly one executor.
    Running,
    /// Suspended on an unresolved future; enlisted in its chain.
    Waiting(FutureId),
    /// Completed with a value.
    Finished(Value),
    /// Stopped on a fault.
    Errored(ErrorSignal),
}

/// A machine thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Stable, monotonically assigned identifier.
    pub id: ThreadId,
    /// Lifecycle status.
    pub status: ThreadStatus,
    /// Resumable execution state.
    pub state: ThreadState,
    /// The future resolved with this thread's result when it finishes or
    /// errors. Awaiting it is how other threads join this one.
    pub terminal: FutureId,
}

impl Thread {
    /// Create a ready thread positioned at a function entry with its
    /// parameters pre-bound.
    #[must_use]
    pub fn new(
        id: ThreadId,
        terminal: FutureId,
        function: impl Into<String>,
        entry: usize,
        params: &[String],
        args: Vec<Value>,
    ) -> Self {
        let locals = params.iter().cloned().zip(args).collect();
        Self {
            id,
            status: ThreadStatus::Ready,
            state: ThreadState {
                function: function.into(),
                ip: entry,
                stack: Vec::new(),
                locals,
                frames: Vec::new(),
            },
            terminal,
        }
    }

    /// Whether the thread has finished or errored.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ThreadStatus::Finished(_) | ThreadStatus::Errored(_)
        )
    }
}
