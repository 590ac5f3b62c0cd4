//! The Hark abstract machine.
//!
//! Hark programs compile to instructions for a stack machine whose `async`
//! and `await` are first-class: `async f(...)` forks a lightweight thread
//! and evaluates to a future, `await` suspends the caller until that future
//! resolves. Threads are plain data records, so the same runtime executes
//! across local worker threads or across ephemeral remote workers sharing a
//! transactional store.
//!
//! # Architecture
//!
//! - **Instructions** ([`instr::Instr`]): stack ops, calls, fork (`ACall`),
//!   and suspension (`Wait`)
//! - **Compiler** ([`compiler::compile`]): checked program tree →
//!   [`loader::CodeImage`]
//! - **Threads & futures** ([`thread::Thread`], [`future::Future`]):
//!   resumable interpreter states joined through write-once cells
//! - **Controller** ([`controller::Controller`]): the transactional
//!   authority over all shared state, in memory
//!   ([`controller::MemoryController`]) or in a versioned store
//!   ([`controller::StoreController`])
//! - **Executor** ([`executor::Executor`]): bounded stepping of one leased
//!   thread on a local snapshot
//! - **Foreign bridge** ([`foreign::ForeignRegistry`]): host procedures
//!   under qualified names
//! - **Drivers** ([`driver::SingleThreadDriver`],
//!   [`driver::PooledDriver`]): the lease/step/commit/wake loop
//!
//! # Usage
//!
//! ```ignore
//! use hark_vm::{compiler, ControllerConfig, ForeignRegistry, MemoryController,
//!     RunConfig, SingleThreadDriver};
//!
//! let image = compiler::compile(&module)?;
//! let controller = MemoryController::new(image, ControllerConfig::default())?;
//! let mut driver = SingleThreadDriver::new(controller, ForeignRegistry::new(),
//!     RunConfig::default());
//! let outcome = driver.run_program("main", vec![])?;
//! ```

pub mod compiler;
pub mod controller;
pub mod driver;
pub mod error;
pub mod executor;
pub mod foreign;
pub mod future;
pub mod instr;
pub mod loader;
pub mod thread;

pub use compiler::CompileError;
pub use controller::{
    Controller, ControllerConfig, ControllerSnapshot, Lease, MemoryController, MemoryStore,
    StateStore, StoreController,
};
pub use driver::{ObsEvent, PooledDriver, RunConfig, RunOutcome, SingleThreadDriver};
pub use error::MachineError;
pub use executor::{Executor, IdReserver, Outbox, Spawn, StepOutcome};
pub use foreign::ForeignRegistry;
pub use future::Future;
pub use instr::Instr;
pub use loader::CodeImage;
pub use thread::{Frame, Thread, ThreadState, ThreadStatus};
