//! Deterministic single-threaded driver.

use std::time::Duration;

use hark_types::{FutureId, ThreadId, Value};

use crate::controller::Controller;
use crate::driver::{poll_outcome, record_step, ObsEvent, RunConfig, RunOutcome};
use crate::error::MachineError;
use crate::executor::Executor;
use crate::foreign::ForeignRegistry;

/// Runs one step at a time against a controller. With the in-memory
/// controller this is fully deterministic: the FIFO ready queue fixes the
/// interleaving.
pub struct SingleThreadDriver<C> {
    controller: C,
    foreign: ForeignRegistry,
    config: RunConfig,
    root: Option<(ThreadId, FutureId)>,
    trace: Vec<ObsEvent>,
}

impl<C: Controller> SingleThreadDriver<C> {
    /// Create a driver over a controller and a foreign registry.
    #[must_use]
    pub fn new(controller: C, foreign: ForeignRegistry, config: RunConfig) -> Self {
        Self {
            controller,
            foreign,
            config,
            root: None,
            trace: Vec::new(),
        }
    }

    /// Access the controller.
    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// The recorded observable events.
    #[must_use]
    pub fn trace(&self) -> &[ObsEvent] {
        &self.trace
    }

    /// The preserved print log.
    ///
    /// # Errors
    ///
    /// Fails when the controller is unavailable.
    pub fn stdout(&self) -> Result<Vec<String>, MachineError> {
        self.controller.stdout()
    }

    /// Create the root thread.
    ///
    /// # Errors
    ///
    /// Fails on an unknown function or controller unavailability.
    pub fn start(
        &mut self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(ThreadId, FutureId), MachineError> {
        let ids = self.controller.new_thread(function, args)?;
        self.root = Some(ids);
        Ok(ids)
    }

    /// Drive until the root thread's terminal future resolves.
    ///
    /// # Errors
    ///
    /// Fails on controller errors or when `max_rounds` is exhausted.
    pub fn run(&mut self) -> Result<RunOutcome, MachineError> {
        let (_, terminal) = self.root.ok_or(MachineError::Unavailable {
            reason: "run called before start".into(),
        })?;

        for _ in 0..self.config.max_rounds {
            if let Some(outcome) = poll_outcome(&self.controller, terminal)? {
                return Ok(outcome);
            }

            let Some(mut lease) = self.controller.lease_ready()? else {
                // Nothing leasable right now (e.g. a reclaimed lease still
                // inside its timeout). Back off briefly.
                std::thread::sleep(Duration::from_millis(1));
                continue;
            };

            let code = self.controller.code();
            let executor = Executor::new(
                &code,
                &self.foreign,
                &self.controller,
                self.config.step_budget,
            );
            let (outcome, outbox) = executor.step(&mut lease.state)?;
            record_step(&mut self.trace, lease.thread, &outcome, &outbox, &[]);
            let woken =
                self.controller
                    .commit_step(lease.thread, lease.token, lease.state, outcome, outbox)?;
            for &thread in &woken {
                self.trace.push(ObsEvent::Woken { thread });
            }
            self.controller.wake(&woken)?;
        }

        Err(MachineError::Unavailable {
            reason: "max rounds exhausted".into(),
        })
    }

    /// Convenience: start `function` and drive it to completion.
    ///
    /// # Errors
    ///
    /// See [`SingleThreadDriver::start`] and [`SingleThreadDriver::run`].
    pub fn run_program(
        &mut self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<RunOutcome, MachineError> {
        self.start(function, args)?;
        self.run()
    }
}
