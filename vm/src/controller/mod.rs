//! The data controller: sole authority over persistent runtime state.
//!
//! Threads, futures, the code image, and the print log all live behind the
//! [`Controller`] trait. Executors and drivers are written once against it;
//! [`MemoryController`] (one process, one mutex) and
//! [`StoreController`](store::StoreController) (versioned external store,
//! compare-and-set) must produce identical program results for the same
//! sequence of calls.
//!
//! Stepping protocol: `lease_ready` grants an exclusive, token-carrying
//! lease on one ready thread; the executor advances the leased snapshot;
//! `commit_step` applies the snapshot, the outbox, and the step outcome
//! atomically. Commits are idempotent per token, and leases time out, so
//! at-least-once dispatch still yields exactly-once state transitions.

pub mod memory;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hark_types::{FutureId, ThreadId, Value};

use crate::error::MachineError;
use crate::executor::{IdReserver, Outbox, StepOutcome};
use crate::future::Future;
use crate::loader::CodeImage;
use crate::thread::{Thread, ThreadState, ThreadStatus};

pub use memory::MemoryController;
pub use store::{MemoryStore, StateStore, StoreController};

/// Controller tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How long a lease stays valid before the thread returns to ready.
    pub lease_timeout: Duration,
    /// Maximum number of threads in one session.
    pub max_threads: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(30),
            max_threads: 16 * 1024,
        }
    }
}

/// Exclusive right to step one thread, granted by `lease_ready`.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The leased thread.
    pub thread: ThreadId,
    /// Step token; `commit_step` must present it.
    pub token: u64,
    /// Snapshot of the thread's resumable state.
    pub state: ThreadState,
}

/// A consistent copy of controller state, for diagnostics and invariant
/// checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// All threads.
    pub threads: Vec<Thread>,
    /// All futures.
    pub futures: Vec<Future>,
}

/// The transactional store of runtime state. Every method appears atomic to
/// every other method.
pub trait Controller: IdReserver + Send + Sync {
    /// The seeded code image.
    fn code(&self) -> Arc<CodeImage>;

    /// Create a ready thread at a function entry with arguments pre-bound,
    /// along with its terminal future.
    ///
    /// # Errors
    ///
    /// Fails on an unknown function or when the thread limit is reached.
    fn new_thread(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(ThreadId, FutureId), MachineError>;

    /// Atomically pick a ready thread, mark it running, and return a lease.
    /// `None` when nothing is ready. Expired leases are reclaimed here.
    ///
    /// # Errors
    ///
    /// Fails when the backing store is unavailable.
    fn lease_ready(&self) -> Result<Option<Lease>, MachineError>;

    /// Write back a stepped thread atomically: the new snapshot, the spawns
    /// and resolutions from the outbox, the print log, and the status
    /// transition implied by `outcome`. Returns threads that became wakeable
    /// through resolutions performed by this commit; the caller passes them
    /// to [`Controller::wake`].
    ///
    /// Committing `Block(f)` when `f` is already resolved does not suspend:
    /// the value is injected and the thread is ready again (or errored, when
    /// the value is an error signal).
    ///
    /// # Errors
    ///
    /// `LeaseLost` when the token is stale. Replaying an already-committed
    /// token is a successful no-op.
    fn commit_step(
        &self,
        thread: ThreadId,
        token: u64,
        state: ThreadState,
        outcome: StepOutcome,
        outbox: Outbox,
    ) -> Result<Vec<ThreadId>, MachineError>;

    /// Move waiting threads whose futures have resolved back to ready,
    /// injecting the resolved value onto the operand stack where `Wait`
    /// suspended. An injected error signal marks the thread errored instead
    /// and cascades through its own terminal future.
    ///
    /// # Errors
    ///
    /// Fails when the backing store is unavailable.
    fn wake(&self, threads: &[ThreadId]) -> Result<(), MachineError>;

    /// Resolve a future, returning its drained waiter chain.
    ///
    /// # Errors
    ///
    /// `DoubleResolve` on a second resolution; state is not mutated.
    fn resolve(&self, future: FutureId, value: Value) -> Result<Vec<ThreadId>, MachineError>;

    /// Read a future.
    ///
    /// # Errors
    ///
    /// Fails when the future is unknown.
    fn read_future(&self, future: FutureId) -> Result<Future, MachineError>;

    /// Read a thread's status.
    ///
    /// # Errors
    ///
    /// Fails when the thread is unknown.
    fn thread_status(&self, thread: ThreadId) -> Result<ThreadStatus, MachineError>;

    /// The accumulated print log, in append order.
    ///
    /// # Errors
    ///
    /// Fails when the backing store is unavailable.
    fn stdout(&self) -> Result<Vec<String>, MachineError>;

    /// A consistent copy of all threads and futures.
    ///
    /// # Errors
    ///
    /// Fails when the backing store is unavailable.
    fn snapshot(&self) -> Result<ControllerSnapshot, MachineError>;
}
