//! Drivers: the scheduler/invoker loop.
//!
//! A driver owns the run loop over a [`Controller`]: lease a ready thread,
//! execute one step, commit, wake. [`SingleThreadDriver`] is the
//! deterministic in-process loop; [`PooledDriver`] runs the same loop on a
//! rayon worker pool. Distributed mode is the pooled loop pointed at a
//! store-backed controller — the remote-invocation transport that launches
//! workers elsewhere is the scheduler host's concern, not the core's.
//!
//! Scheduling is at-least-once: a worker may die after executing but before
//! committing, in which case the lease expires and another worker re-runs
//! the step. Token-idempotent commits make the state transition happen
//! exactly once regardless.

pub mod pooled;
pub mod single_thread;

use serde::{Deserialize, Serialize};

use hark_types::{ErrorSignal, Fault, FutureId, ThreadId, Value};

use crate::controller::Controller;
use crate::error::MachineError;
use crate::executor::{Outbox, StepOutcome};

pub use pooled::PooledDriver;
pub use single_thread::SingleThreadDriver;

/// Driver tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Instructions per step before a thread yields.
    pub step_budget: usize,
    /// Worker count for the pooled driver.
    pub workers: usize,
    /// Scheduler iterations before a run is abandoned.
    pub max_rounds: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_budget: 256,
            workers: 4,
            max_rounds: 10_000_000,
        }
    }
}

/// The outcome of a program run, read from the root thread's terminal
/// future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The root thread finished with this value.
    Finished(Value),
    /// The run errored; the signal carries the first-origin fault and the
    /// chain of threads that propagated it.
    Errored(ErrorSignal),
}

/// Observable event recorded by the driver as steps commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObsEvent {
    /// A thread forked a child.
    Spawned {
        /// The forking thread.
        parent: ThreadId,
        /// The new thread.
        thread: ThreadId,
        /// Function the child runs.
        function: String,
        /// The child's terminal future.
        future: FutureId,
    },
    /// A thread suspended on a future.
    Blocked {
        /// The suspended thread.
        thread: ThreadId,
        /// The awaited future.
        future: FutureId,
    },
    /// A thread was moved back to ready.
    Woken {
        /// The woken thread.
        thread: ThreadId,
    },
    /// A line was printed.
    Printed {
        /// The printing thread.
        thread: ThreadId,
        /// The line, in canonical value form.
        line: String,
    },
    /// A thread finished.
    Finished {
        /// The finished thread.
        thread: ThreadId,
    },
    /// A thread errored.
    Errored {
        /// The errored thread.
        thread: ThreadId,
        /// The fault.
        fault: Fault,
    },
}

/// Record the observable events of one committed step.
pub(crate) fn record_step(
    trace: &mut Vec<ObsEvent>,
    thread: ThreadId,
    outcome: &StepOutcome,
    outbox: &Outbox,
    woken: &[ThreadId],
) {
    for spawn in &outbox.spawns {
        trace.push(ObsEvent::Spawned {
            parent: thread,
            thread: spawn.thread,
            function: spawn.function.clone(),
            future: spawn.future,
        });
    }
    for line in &outbox.prints {
        trace.push(ObsEvent::Printed {
            thread,
            line: line.clone(),
        });
    }
    match outcome {
        StepOutcome::Yield => {}
        StepOutcome::Block(future) => trace.push(ObsEvent::Blocked {
            thread,
            future: *future,
        }),
        StepOutcome::Finish(_) => trace.push(ObsEvent::Finished { thread }),
        StepOutcome::Fail(fault) => trace.push(ObsEvent::Errored {
            thread,
            fault: fault.clone(),
        }),
    }
    for &woken in woken {
        trace.push(ObsEvent::Woken { thread: woken });
    }
}

/// Read the run outcome from a terminal future, if resolved yet.
pub(crate) fn poll_outcome<C: Controller + ?Sized>(
    controller: &C,
    terminal: FutureId,
) -> Result<Option<RunOutcome>, MachineError> {
    let future = controller.read_future(terminal)?;
    if !future.resolved {
        return Ok(None);
    }
    let value = future.value.expect("resolved future has a value");
    Ok(Some(match value {
        Value::Error(signal) => RunOutcome::Errored(*signal),
        value => RunOutcome::Finished(value),
    }))
}
