//! Worker-pool driver.
//!
//! N workers share one controller and run the lease/step/commit/wake loop
//! concurrently. Each worker acts on a distinct leased thread, so parallel
//! executors never touch the same thread state; everything shared goes
//! through the controller. Pointed at a store-backed controller, the same
//! loop is what a remote (e.g. serverless) executor fleet runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};

use hark_types::{FutureId, ThreadId, Value};

use crate::controller::Controller;
use crate::driver::{poll_outcome, record_step, ObsEvent, RunConfig, RunOutcome};
use crate::error::MachineError;
use crate::executor::Executor;
use crate::foreign::ForeignRegistry;

/// Drives a controller with a pool of worker threads.
pub struct PooledDriver<C> {
    controller: C,
    foreign: ForeignRegistry,
    config: RunConfig,
    root: Option<(ThreadId, FutureId)>,
    trace: Mutex<Vec<ObsEvent>>,
}

impl<C: Controller> PooledDriver<C> {
    /// Create a pooled driver over a controller and a foreign registry.
    #[must_use]
    pub fn new(controller: C, foreign: ForeignRegistry, config: RunConfig) -> Self {
        Self {
            controller,
            foreign,
            config,
            root: None,
            trace: Mutex::new(Vec::new()),
        }
    }

    /// Access the controller.
    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// A copy of the recorded observable events.
    #[must_use]
    pub fn trace(&self) -> Vec<ObsEvent> {
        self.trace.lock().map(|t| t.clone()).unwrap_or_default()
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

    /// Drive with `config.workers` parallel executors until the root
    /// thread's terminal future resolves.
    ///
    /// # Errors
    ///
    /// Fails on controller errors or when `max_rounds` is exhausted.
    pub fn run(&mut self) -> Result<RunOutcome, MachineError> {
        let (_, terminal) = self.root.ok_or(MachineError::Unavailable {
            reason: "run called before start".into(),
        })?;

        let pool: ThreadPool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| MachineError::Unavailable {
                reason: format!("worker pool: {e}"),
            })?;

        let stop = AtomicBool::new(false);
        let rounds = AtomicUsize::new(0);
        let failure: Mutex<Option<MachineError>> = Mutex::new(None);
        let this = &*self;

        pool.scope(|scope| {
            for _ in 0..this.config.workers.max(1) {
                scope.spawn(|_| {
                    while !stop.load(Ordering::Acquire) {
                        if rounds.fetch_add(1, Ordering::Relaxed) >= this.config.max_rounds {
                            this.record_failure(&failure, MachineError::Unavailable {
                                reason: "max rounds exhausted".into(),
                            });
                            stop.store(true, Ordering::Release);
                            break;
                        }
                        match this.cycle(terminal) {
                            Ok(true) => {
                                stop.store(true, Ordering::Release);
                                break;
                            }
                            Ok(false) => {}
                            // Another worker superseded this lease; the step
                            // was not applied twice.
                            Err(MachineError::LeaseLost { thread }) => {
                                tracing::debug!(%thread, "commit superseded");
                            }
                            Err(err) => {
                                this.record_failure(&failure, err);
                                stop.store(true, Ordering::Release);
                                break;
                            }
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(err);
        }
        poll_outcome(&self.controller, terminal)?.ok_or(MachineError::Unavailable {
            reason: "stopped before the terminal future resolved".into(),
        })
    }

    /// One worker iteration. Returns `true` once the run is complete.
    fn cycle(&self, terminal: FutureId) -> Result<bool, MachineError> {
        if poll_outcome(&self.controller, terminal)?.is_some() {
            return Ok(true);
        }
        let Some(mut lease) = self.controller.lease_ready()? else {
            std::thread::sleep(Duration::from_millis(1));
            return Ok(false);
        };

        let code = self.controller.code();
        let executor = Executor::new(
            &code,
            &self.foreign,
            &self.controller,
            self.config.step_budget,
        );
        let (outcome, outbox) = executor.step(&mut lease.state)?;
        let woken =
            self.controller
                .commit_step(lease.thread, lease.token, lease.state, outcome.clone(), outbox.clone())?;
        if let Ok(mut trace) = self.trace.lock() {
            record_step(&mut trace, lease.thread, &outcome, &outbox, &woken);
        }
        self.controller.wake(&woken)?;
        Ok(false)
    }

    fn record_failure(&self, failure: &Mutex<Option<MachineError>>, err: MachineError) {
        if let Ok(mut slot) = failure.lock() {
            slot.get_or_insert(err);
        }
    }
}
