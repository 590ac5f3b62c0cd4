//! In-memory reference controller.
//!
//! One mutex over all state makes every API call trivially atomic; this is
//! the semantics the store-backed controller must reproduce. The ready set
//! is a FIFO queue, so any thread that becomes ready is eventually leased.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use hark_types::{ErrorSignal, FutureId, ThreadId, Value};

use crate::controller::{Controller, ControllerConfig, ControllerSnapshot, Lease};
use crate::error::MachineError;
use crate::executor::{IdReserver, Outbox, StepOutcome};
use crate::future::Future;
use crate::loader::CodeImage;
use crate::thread::{Thread, ThreadState, ThreadStatus};

struct LeaseHold {
    token: u64,
    expires_at: Instant,
}

struct ThreadRecord {
    thread: Thread,
    lease: Option<LeaseHold>,
    committed: Option<u64>,
}

#[derive(Default)]
struct Inner {
    threads: BTreeMap<ThreadId, ThreadRecord>,
    futures: BTreeMap<FutureId, Future>,
    ready: VecDeque<ThreadId>,
    next_thread: u64,
    next_future: u64,
    next_token: u64,
    stdout: Vec<String>,
}

/// Mutex-protected controller for single-process runs.
pub struct MemoryController {
    code: Arc<CodeImage>,
    config: ControllerConfig,
    inner: Mutex<Inner>,
}

impl MemoryController {
    /// Seed a controller with a validated code image.
    ///
    /// # Errors
    ///
    /// Returns `MachineError::MalformedCode` if the image fails validation.
    pub fn new(image: CodeImage, config: ControllerConfig) -> Result<Self, MachineError> {
        image.validate()?;
        Ok(Self {
            code: Arc::new(image),
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, MachineError> {
        self.inner.lock().map_err(|_| MachineError::Unavailable {
            reason: "controller mutex poisoned".into(),
        })
    }

    fn create_thread(
        inner: &mut Inner,
        code: &CodeImage,
        id: ThreadId,
        terminal: FutureId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(), MachineError> {
        let entry = code
            .function(function)
            .ok_or_else(|| MachineError::UndefinedFunction {
                name: function.to_string(),
            })?;
        inner.futures.insert(terminal, Future::new(terminal));
        let thread = Thread::new(id, terminal, function, entry.entry, &entry.params, args);
        inner.threads.insert(
            id,
            ThreadRecord {
                thread,
                lease: None,
                committed: None,
            },
        );
        inner.ready.push_back(id);
        Ok(())
    }

    fn resolve_locked(
        inner: &mut Inner,
        future: FutureId,
        value: Value,
    ) -> Result<Vec<ThreadId>, MachineError> {
        let fut = inner
            .futures
            .get_mut(&future)
            .ok_or(MachineError::UnknownFuture { future })?;
        fut.resolve(value)
            .ok_or(MachineError::DoubleResolve { future })
    }
}

impl IdReserver for MemoryController {
    fn reserve_pair(&self) -> Result<(ThreadId, FutureId), MachineError> {
        let mut inner = self.lock()?;
        if inner.threads.len() >= self.config.max_threads {
            return Err(MachineError::TooManyThreads {
                max: self.config.max_threads,
            });
        }
        let thread = ThreadId(inner.next_thread);
        let future = FutureId(inner.next_future);
        inner.next_thread += 1;
        inner.next_future += 1;
        Ok((thread, future))
    }
}

impl Controller for MemoryController {
    fn code(&self) -> Arc<CodeImage> {
        Arc::clone(&self.code)
    }

    fn new_thread(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(ThreadId, FutureId), MachineError> {
        let mut inner = self.lock()?;
        if inner.threads.len() >= self.config.max_threads {
            return Err(MachineError::TooManyThreads {
                max: self.config.max_threads,
            });
        }
        let thread = ThreadId(inner.next_thread);
        let future = FutureId(inner.next_future);
        inner.next_thread += 1;
        inner.next_future += 1;
        Self::create_thread(&mut inner, &self.code, thread, future, function, args)?;
        tracing::debug!(%thread, %future, function, "thread created");
        Ok((thread, future))
    }

    fn lease_ready(&self) -> Result<Option<Lease>, MachineError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let now = Instant::now();

        // Void expired leases: the thread returns to ready and the stale
        // token can no longer commit.
        let expired: Vec<ThreadId> = inner
            .threads
            .iter()
            .filter(|(_, rec)| {
                matches!(rec.thread.status, ThreadStatus::Running)
                    && rec.lease.as_ref().is_some_and(|l| l.expires_at <= now)
            })
            .map(|(&id, _)| id)
            .collect();
        for id in expired {
            tracing::warn!(thread = %id, "lease expired, reclaiming");
            let rec = inner.threads.get_mut(&id).expect("record exists");
            rec.lease = None;
            rec.thread.status = ThreadStatus::Ready;
            inner.ready.push_back(id);
        }

        while let Some(id) = inner.ready.pop_front() {
            let token = inner.next_token;
            let Some(rec) = inner.threads.get_mut(&id) else {
                continue;
            };
            if rec.thread.status != ThreadStatus::Ready {
                // Stale queue entry from an earlier transition.
                continue;
            }
            inner.next_token += 1;
            rec.thread.status = ThreadStatus::Running;
            rec.lease = Some(LeaseHold {
                token,
                expires_at: now + self.config.lease_timeout,
            });
            return Ok(Some(Lease {
                thread: id,
                token,
                state: rec.thread.state.clone(),
            }));
        }
        Ok(None)
    }

    fn commit_step(
        &self,
        thread: ThreadId,
        token: u64,
        state: ThreadState,
        outcome: StepOutcome,
        outbox: Outbox,
    ) -> Result<Vec<ThreadId>, MachineError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let rec = inner
            .threads
            .get(&thread)
            .ok_or(MachineError::UnknownThread { thread })?;
        if rec.committed == Some(token) {
            // Replay under at-least-once dispatch: already applied.
            return Ok(Vec::new());
        }
        match &rec.lease {
            Some(hold) if hold.token == token => {}
            _ => return Err(MachineError::LeaseLost { thread }),
        }

        // Validate everything before mutating anything, so a rejected commit
        // leaves no partial effects.
        for spawn in &outbox.spawns {
            if self.code.function(&spawn.function).is_none() {
                return Err(MachineError::UndefinedFunction {
                    name: spawn.function.clone(),
                });
            }
        }
        if inner.threads.len() + outbox.spawns.len() > self.config.max_threads {
            return Err(MachineError::TooManyThreads {
                max: self.config.max_threads,
            });
        }
        for (future, _) in &outbox.resolutions {
            match inner.futures.get(future) {
                None => return Err(MachineError::UnknownFuture { future: *future }),
                Some(f) if f.resolved => {
                    return Err(MachineError::DoubleResolve { future: *future })
                }
                Some(_) => {}
            }
        }
        let blocked_value = match &outcome {
            StepOutcome::Block(future) => {
                let fut = inner
                    .futures
                    .get(future)
                    .ok_or(MachineError::UnknownFuture { future: *future })?;
                fut.resolved.then(|| fut.value.clone().expect("resolved"))
            }
            _ => None,
        };

        let mut woken = Vec::new();

        for spawn in outbox.spawns {
            tracing::debug!(parent = %thread, thread = %spawn.thread, function = %spawn.function, "spawn committed");
            Self::create_thread(
                inner,
                &self.code,
                spawn.thread,
                spawn.future,
                &spawn.function,
                spawn.args,
            )?;
        }
        for (future, value) in outbox.resolutions {
            woken.extend(Self::resolve_locked(inner, future, value)?);
        }
        inner.stdout.extend(outbox.prints);

        // Thread transition; terminal resolutions are deferred out of the
        // record borrow.
        let mut terminal_resolution: Option<(FutureId, Value)> = None;
        {
            let rec = inner.threads.get_mut(&thread).expect("record exists");
            rec.thread.state = state;
            match outcome {
                StepOutcome::Yield => {
                    rec.thread.status = ThreadStatus::Ready;
                    inner.ready.push_back(thread);
                }
                StepOutcome::Finish(value) => {
                    rec.thread.status = ThreadStatus::Finished(value.clone());
                    terminal_resolution = Some((rec.thread.terminal, value));
                }
                StepOutcome::Fail(fault) => {
                    tracing::debug!(%thread, %fault, "thread errored");
                    let signal = ErrorSignal::new(fault, thread);
                    rec.thread.status = ThreadStatus::Errored(signal.clone());
                    terminal_resolution =
                        Some((rec.thread.terminal, Value::Error(Box::new(signal))));
                }
                StepOutcome::Block(future) => match blocked_value {
                    // Already resolved: inject without suspending.
                    Some(Value::Error(signal)) => {
                        let extended = signal.via(thread);
                        rec.thread.status = ThreadStatus::Errored(extended.clone());
                        terminal_resolution =
                            Some((rec.thread.terminal, Value::Error(Box::new(extended))));
                    }
                    Some(value) => {
                        rec.thread.state.stack.push(value);
                        rec.thread.status = ThreadStatus::Ready;
                        inner.ready.push_back(thread);
                    }
                    None => {
                        rec.thread.status = ThreadStatus::Waiting(future);
                        let fut = inner.futures.get_mut(&future).expect("validated");
                        if !fut.chain.contains(&thread) {
                            fut.chain.push(thread);
                        }
                    }
                },
            }
            rec.lease = None;
            rec.committed = Some(token);
        }
        if let Some((future, value)) = terminal_resolution {
            woken.extend(Self::resolve_locked(inner, future, value)?);
        }

        Ok(woken)
    }

    fn wake(&self, threads: &[ThreadId]) -> Result<(), MachineError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let mut queue: VecDeque<ThreadId> = threads.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            let Some(rec) = inner.threads.get(&id) else {
                tracing::warn!(thread = %id, "wake of unknown thread");
                continue;
            };
            let ThreadStatus::Waiting(future) = &rec.thread.status else {
                continue;
            };
            let future = *future;
            let Some(fut) = inner.futures.get(&future) else {
                continue;
            };
            if !fut.resolved {
                continue;
            }
            let value = fut.value.clone().expect("resolved");
            let rec = inner.threads.get_mut(&id).expect("record exists");
            match value {
                Value::Error(signal) => {
                    // Error values flow through await: the waiter errors and
                    // the signal cascades to its own waiters.
                    let extended = signal.via(id);
                    rec.thread.status = ThreadStatus::Errored(extended.clone());
                    let terminal = rec.thread.terminal;
                    if let Some(fut) = inner.futures.get_mut(&terminal) {
                        if let Some(chain) = fut.resolve(Value::Error(Box::new(extended))) {
                            queue.extend(chain);
                        }
                    }
                }
                value => {
                    rec.thread.state.stack.push(value);
                    rec.thread.status = ThreadStatus::Ready;
                    inner.ready.push_back(id);
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, future: FutureId, value: Value) -> Result<Vec<ThreadId>, MachineError> {
        let mut inner = self.lock()?;
        Self::resolve_locked(&mut inner, future, value)
    }

    fn read_future(&self, future: FutureId) -> Result<Future, MachineError> {
        let inner = self.lock()?;
        inner
            .futures
            .get(&future)
            .cloned()
            .ok_or(MachineError::UnknownFuture { future })
    }

    fn thread_status(&self, thread: ThreadId) -> Result<ThreadStatus, MachineError> {
        let inner = self.lock()?;
        inner
            .threads
            .get(&thread)
            .map(|rec| rec.thread.status.clone())
            .ok_or(MachineError::UnknownThread { thread })
    }

    fn stdout(&self) -> Result<Vec<String>, MachineError> {
        Ok(self.lock()?.stdout.clone())
    }

    fn snapshot(&self) -> Result<ControllerSnapshot, MachineError> {
        let inner = self.lock()?;
        Ok(ControllerSnapshot {
            threads: inner.threads.values().map(|rec| rec.thread.clone()).collect(),
            futures: inner.futures.values().cloned().collect(),
        })
    }
}
