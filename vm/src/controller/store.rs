//! Store-backed controller for distributed runs.
//!
//! State lives in a versioned key/value store: one record per thread, one
//! per future, plus `counters`, `code`, and per-commit print records, all
//! under a session prefix. Every update is a compare-and-set conditional on
//! the version observed when the record was read.
//!
//! `commit_step` is a single CAS on the thread record that carries the new
//! snapshot, the committed step token, and the still-pending outbox; the
//! apply phase then materializes spawns, resolutions, and chain enlistment
//! record by record. Because the pending outbox (with its pre-reserved ids)
//! is part of the committed record, a worker that crashes mid-apply leaves a
//! record any other worker can finish — `lease_ready` completes pending
//! outboxes it encounters, and every apply action is idempotent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use hark_types::{ErrorSignal, FutureId, ThreadId, Value};

use crate::controller::{Controller, ControllerConfig, ControllerSnapshot, Lease};
use crate::error::MachineError;
use crate::executor::{IdReserver, Outbox, StepOutcome};
use crate::future::Future;
use crate::loader::CodeImage;
use crate::thread::{Thread, ThreadState, ThreadStatus};

/// Retry bound for compare-and-set loops before reporting the controller
/// unavailable.
const CAS_RETRIES: usize = 32;

/// Errors from a state-store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The expected version did not match.
    #[error("version conflict on {key}")]
    Conflict {
        /// The contended key.
        key: String,
    },
    /// The backend itself failed.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },
}

/// Version expectation for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The key must not exist.
    Absent,
    /// The key must currently have this version.
    Version(u64),
}

/// A record with its version.
#[derive(Debug, Clone)]
pub struct Versioned {
    /// Monotonic per-key version, bumped by every successful write.
    pub version: u64,
    /// JSON payload.
    pub payload: String,
}

/// A durable transactional key/value store with conditional writes.
///
/// This is the surface a cloud table (e.g. a DynamoDB-style store with
/// conditional puts) must provide; [`MemoryStore`] is the reference backend
/// used by tests.
pub trait StateStore: Send + Sync {
    /// Read a record.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Conditionally write a record, returning the new version.
    ///
    /// # Errors
    ///
    /// `Conflict` when the expectation does not hold.
    fn put(&self, key: &str, expect: Expect, payload: String) -> Result<u64, StoreError>;

    /// List keys under a prefix, in lexical order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backend fails.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, expect: Expect, payload: String) -> Result<u64, StoreError> {
        (**self).put(key, expect, payload)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix)
    }
}

/// In-memory [`StateStore`] with the same conditional-write semantics a
/// remote table provides.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, (u64, String)>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Backend {
            reason: "store mutex poisoned".into(),
        })?;
        Ok(records.get(key).map(|(version, payload)| Versioned {
            version: *version,
            payload: payload.clone(),
        }))
    }

    fn put(&self, key: &str, expect: Expect, payload: String) -> Result<u64, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Backend {
            reason: "store mutex poisoned".into(),
        })?;
        let current = records.get(key).map(|(version, _)| *version);
        let next = match (expect, current) {
            (Expect::Absent, None) => 1,
            (Expect::Version(v), Some(cur)) if cur == v => cur + 1,
            _ => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                })
            }
        };
        records.insert(key.to_string(), (next, payload));
        Ok(next)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Backend {
            reason: "store mutex poisoned".into(),
        })?;
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLease {
    token: u64,
    expires_at_ms: u128,
}

/// The outbox of a committed step, kept until fully applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingCommit {
    outcome: StepOutcome,
    outbox: Outbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredThread {
    thread: Thread,
    lease: Option<StoredLease>,
    committed: Option<u64>,
    pending: Option<PendingCommit>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Counters {
    next_thread: u64,
    next_future: u64,
    next_token: u64,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Controller backed by a [`StateStore`].
///
/// Multiple workers (processes, serverless invocations) may attach to the
/// same store and session concurrently; per-record compare-and-set plus
/// token-idempotent commits keep state transitions exactly-once.
pub struct StoreController<S> {
    store: S,
    session: String,
    code: Arc<CodeImage>,
    config: ControllerConfig,
    scan_cursor: AtomicU64,
}

impl<S: StateStore> StoreController<S> {
    /// Attach to (and, if necessary, seed) a session in the store.
    ///
    /// # Errors
    ///
    /// Fails on image validation errors or when the store is unreachable.
    pub fn open(
        store: S,
        session: impl Into<String>,
        image: CodeImage,
        config: ControllerConfig,
    ) -> Result<Self, MachineError> {
        image.validate()?;
        let controller = Self {
            store,
            session: session.into(),
            code: Arc::new(image),
            config,
            scan_cursor: AtomicU64::new(0),
        };
        controller.seed()?;
        Ok(controller)
    }

    fn seed(&self) -> Result<(), MachineError> {
        let code_key = format!("{}/code", self.session);
        if self.read_raw(&code_key)?.is_none() {
            let payload = encode(&*self.code)?;
            match self.store.put(&code_key, Expect::Absent, payload) {
                Ok(_) | Err(StoreError::Conflict { .. }) => {}
                Err(err) => return Err(unavailable(err)),
            }
        }
        let counters_key = self.counters_key();
        if self.read_raw(&counters_key)?.is_none() {
            let payload = encode(&Counters::default())?;
            match self.store.put(&counters_key, Expect::Absent, payload) {
                Ok(_) | Err(StoreError::Conflict { .. }) => {}
                Err(err) => return Err(unavailable(err)),
            }
        }
        Ok(())
    }

    fn thread_key(&self, id: ThreadId) -> String {
        format!("{}/threads/{:020}", self.session, id.0)
    }

    fn future_key(&self, id: FutureId) -> String {
        format!("{}/futures/{:020}", self.session, id.0)
    }

    fn counters_key(&self) -> String {
        format!("{}/counters", self.session)
    }

    fn prints_key(&self, token: u64) -> String {
        format!("{}/prints/{token:020}", self.session)
    }

    fn read_raw(&self, key: &str) -> Result<Option<Versioned>, MachineError> {
        self.store.get(key).map_err(unavailable)
    }

    fn read_record<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(u64, T)>, MachineError> {
        match self.read_raw(key)? {
            None => Ok(None),
            Some(versioned) => {
                let record = decode(&versioned.payload)?;
                Ok(Some((versioned.version, record)))
            }
        }
    }

    /// Read-modify-write with bounded CAS retries.
    fn modify<T, F>(&self, key: &str, mut apply: F) -> Result<T, MachineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Result<T, MachineError>,
    {
        for _ in 0..CAS_RETRIES {
            let current = self.read_raw(key)?;
            let (expect, record) = match &current {
                None => (Expect::Absent, None),
                Some(v) => (Expect::Version(v.version), Some(decode::<T>(&v.payload)?)),
            };
            let next = apply(record)?;
            let payload = encode(&next)?;
            match self.store.put(key, expect, payload) {
                Ok(_) => return Ok(next),
                Err(StoreError::Conflict { .. }) => continue,
                Err(err) => return Err(unavailable(err)),
            }
        }
        Err(MachineError::Unavailable {
            reason: format!("too much contention on {key}"),
        })
    }

    fn bump_counters(
        &self,
        threads: u64,
        futures: u64,
        tokens: u64,
    ) -> Result<Counters, MachineError> {
        let key = self.counters_key();
        self.modify::<Counters, _>(&key, |current| {
            let mut counters = current.unwrap_or_default();
            counters.next_thread += threads;
            counters.next_future += futures;
            counters.next_token += tokens;
            Ok(counters)
        })
    }

    fn thread_ids(&self) -> Result<Vec<ThreadId>, MachineError> {
        let prefix = format!("{}/threads/", self.session);
        let keys = self.store.list(&prefix).map_err(unavailable)?;
        Ok(keys
            .iter()
            .filter_map(|key| key.rsplit('/').next()?.parse::<u64>().ok())
            .map(ThreadId)
            .collect())
    }

    fn create_spawned(
        &self,
        thread: ThreadId,
        terminal: FutureId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(), MachineError> {
        let entry = self
            .code
            .function(function)
            .ok_or_else(|| MachineError::UndefinedFunction {
                name: function.to_string(),
            })?;
        let future_payload = encode(&Future::new(terminal))?;
        match self
            .store
            .put(&self.future_key(terminal), Expect::Absent, future_payload)
        {
            // Conflict: an earlier apply of this commit already created it.
            Ok(_) | Err(StoreError::Conflict { .. }) => {}
            Err(err) => return Err(unavailable(err)),
        }
        let record = StoredThread {
            thread: Thread::new(thread, terminal, function, entry.entry, &entry.params, args),
            lease: None,
            committed: None,
            pending: None,
        };
        match self
            .store
            .put(&self.thread_key(thread), Expect::Absent, encode(&record)?)
        {
            Ok(_) | Err(StoreError::Conflict { .. }) => Ok(()),
            Err(err) => Err(unavailable(err)),
        }
    }

    /// Resolve a future record, returning its drained chain; `None` when the
    /// future was already resolved.
    fn resolve_record(
        &self,
        future: FutureId,
        value: &Value,
    ) -> Result<Option<Vec<ThreadId>>, MachineError> {
        let key = self.future_key(future);
        for _ in 0..CAS_RETRIES {
            let Some((version, mut record)) = self.read_record::<Future>(&key)? else {
                return Err(MachineError::UnknownFuture { future });
            };
            let Some(chain) = record.resolve(value.clone()) else {
                return Ok(None);
            };
            match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                Ok(_) => return Ok(Some(chain)),
                Err(StoreError::Conflict { .. }) => continue,
                Err(err) => return Err(unavailable(err)),
            }
        }
        Err(MachineError::Unavailable {
            reason: format!("too much contention on {key}"),
        })
    }

    /// Try to move one waiting thread forward; returns further threads to
    /// wake (cascade through an error terminal).
    fn wake_one(&self, id: ThreadId) -> Result<Vec<ThreadId>, MachineError> {
        let key = self.thread_key(id);
        // Survives CAS retries: a chain drained on an earlier attempt must
        // not be lost when the thread write races.
        let mut cascade: Vec<ThreadId> = Vec::new();
        for _ in 0..CAS_RETRIES {
            let Some((version, mut record)) = self.read_record::<StoredThread>(&key)? else {
                tracing::warn!(thread = %id, "wake of unknown thread");
                return Ok(Vec::new());
            };
            let ThreadStatus::Waiting(future) = record.thread.status else {
                return Ok(Vec::new());
            };
            let Some((_, fut)) = self.read_record::<Future>(&self.future_key(future))? else {
                return Ok(Vec::new());
            };
            if !fut.resolved {
                return Ok(Vec::new());
            }
            let value = fut.value.clone().expect("resolved future has a value");

            match value {
                Value::Error(signal) => {
                    let extended = signal.via(id);
                    // Terminal first: if the write below loses the race, the
                    // retry finds the terminal already resolved and skips it.
                    if let Some(chain) = self.resolve_record(
                        record.thread.terminal,
                        &Value::Error(Box::new(extended.clone())),
                    )? {
                        cascade.extend(chain);
                    }
                    record.thread.status = ThreadStatus::Errored(extended);
                    match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                        Ok(_) => return Ok(cascade),
                        Err(StoreError::Conflict { .. }) => continue,
                        Err(err) => return Err(unavailable(err)),
                    }
                }
                value => {
                    record.thread.state.stack.push(value);
                    record.thread.status = ThreadStatus::Ready;
                    match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                        Ok(_) => return Ok(cascade),
                        Err(StoreError::Conflict { .. }) => continue,
                        Err(err) => return Err(unavailable(err)),
                    }
                }
            }
        }
        Err(MachineError::Unavailable {
            reason: format!("too much contention on {key}"),
        })
    }

    /// Materialize a committed-but-pending outbox. Idempotent: every action
    /// either creates-if-absent or skips already-resolved records.
    fn apply_pending(&self, id: ThreadId, token: u64) -> Result<Vec<ThreadId>, MachineError> {
        let key = self.thread_key(id);
        let Some((_, record)) = self.read_record::<StoredThread>(&key)? else {
            return Err(MachineError::UnknownThread { thread: id });
        };
        let Some(pending) = record.pending.clone() else {
            return Ok(Vec::new());
        };

        let mut woken = Vec::new();

        for spawn in &pending.outbox.spawns {
            self.create_spawned(spawn.thread, spawn.future, &spawn.function, spawn.args.clone())?;
        }
        for (future, value) in &pending.outbox.resolutions {
            if let Some(chain) = self.resolve_record(*future, value)? {
                woken.extend(chain);
            }
        }
        if !pending.outbox.prints.is_empty() {
            match self.store.put(
                &self.prints_key(token),
                Expect::Absent,
                encode(&pending.outbox.prints)?,
            ) {
                // Conflict: a crashed apply already wrote this commit's lines.
                Ok(_) | Err(StoreError::Conflict { .. }) => {}
                Err(err) => return Err(unavailable(err)),
            }
        }

        match &pending.outcome {
            StepOutcome::Yield => {}
            StepOutcome::Finish(value) => {
                if let Some(chain) = self.resolve_record(record.thread.terminal, value)? {
                    woken.extend(chain);
                }
            }
            StepOutcome::Fail(fault) => {
                let signal = ErrorSignal::new(fault.clone(), id);
                if let Some(chain) = self
                    .resolve_record(record.thread.terminal, &Value::Error(Box::new(signal)))?
                {
                    woken.extend(chain);
                }
            }
            StepOutcome::Block(future) => {
                self.enlist_waiter(*future, id)?;
                // If the future is already resolved, inject right away.
                woken.extend(self.wake_one(id)?);
            }
        }

        // Clear the pending marker; the commit is fully applied.
        self.modify::<StoredThread, _>(&key, |current| {
            let mut rec = current.ok_or(MachineError::UnknownThread { thread: id })?;
            if rec.committed == Some(token) {
                rec.pending = None;
            }
            Ok(rec)
        })?;

        Ok(woken)
    }

    /// Add a waiter to a future's chain unless the future already resolved.
    fn enlist_waiter(&self, future: FutureId, waiter: ThreadId) -> Result<(), MachineError> {
        let key = self.future_key(future);
        for _ in 0..CAS_RETRIES {
            let Some((version, mut record)) = self.read_record::<Future>(&key)? else {
                return Err(MachineError::UnknownFuture { future });
            };
            if record.resolved {
                return Ok(());
            }
            if record.chain.contains(&waiter) {
                return Ok(());
            }
            record.chain.push(waiter);
            match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict { .. }) => continue,
                Err(err) => return Err(unavailable(err)),
            }
        }
        Err(MachineError::Unavailable {
            reason: format!("too much contention on {key}"),
        })
    }
}

impl<S: StateStore> IdReserver for StoreController<S> {
    fn reserve_pair(&self) -> Result<(ThreadId, FutureId), MachineError> {
        if self.thread_ids()?.len() >= self.config.max_threads {
            return Err(MachineError::TooManyThreads {
                max: self.config.max_threads,
            });
        }
        let after = self.bump_counters(1, 1, 0)?;
        Ok((ThreadId(after.next_thread - 1), FutureId(after.next_future - 1)))
    }
}

impl<S: StateStore> Controller for StoreController<S> {
    fn code(&self) -> Arc<CodeImage> {
        Arc::clone(&self.code)
    }

    fn new_thread(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(ThreadId, FutureId), MachineError> {
        let (thread, future) = self.reserve_pair()?;
        self.create_spawned(thread, future, function, args)?;
        tracing::debug!(%thread, %future, function, "thread created");
        Ok((thread, future))
    }

    fn lease_ready(&self) -> Result<Option<Lease>, MachineError> {
        let mut ids = self.thread_ids()?;
        if ids.is_empty() {
            return Ok(None);
        }
        ids.sort_unstable();
        // Rotate the scan start so no ready thread is starved by lower ids.
        let start = (self.scan_cursor.fetch_add(1, Ordering::Relaxed) as usize) % ids.len();
        ids.rotate_left(start);

        let now = now_ms();
        for id in ids {
            let key = self.thread_key(id);
            let Some((version, mut record)) = self.read_record::<StoredThread>(&key)? else {
                continue;
            };

            // Finish a commit another worker left half-applied.
            if record.pending.is_some() && record.lease.is_none() {
                if let Some(token) = record.committed {
                    let woken = self.apply_pending(id, token)?;
                    self.wake(&woken)?;
                }
                continue;
            }

            match record.thread.status {
                ThreadStatus::Ready => {
                    let counters = self.bump_counters(0, 0, 1)?;
                    let token = counters.next_token - 1;
                    record.thread.status = ThreadStatus::Running;
                    record.lease = Some(StoredLease {
                        token,
                        expires_at_ms: now + self.config.lease_timeout.as_millis(),
                    });
                    let state = record.thread.state.clone();
                    match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                        Ok(_) => {
                            return Ok(Some(Lease {
                                thread: id,
                                token,
                                state,
                            }))
                        }
                        // Another worker leased it first.
                        Err(StoreError::Conflict { .. }) => continue,
                        Err(err) => return Err(unavailable(err)),
                    }
                }
                ThreadStatus::Running => {
                    let expired = record.lease.as_ref().is_some_and(|l| l.expires_at_ms <= now);
                    if expired {
                        tracing::warn!(thread = %id, "lease expired, reclaiming");
                        record.lease = None;
                        record.thread.status = ThreadStatus::Ready;
                        match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                            Ok(_) | Err(StoreError::Conflict { .. }) => {}
                            Err(err) => return Err(unavailable(err)),
                        }
                    }
                }
                ThreadStatus::Waiting(future) => {
                    // Heal a lost wakeup: waiting on an already-resolved
                    // future.
                    if let Some((_, fut)) = self.read_record::<Future>(&self.future_key(future))? {
                        if fut.resolved {
                            let woken = self.wake_one(id)?;
                            self.wake(&woken)?;
                        }
                    }
                }
                ThreadStatus::Finished(_) | ThreadStatus::Errored(_) => {}
            }
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
        for spawn in &outbox.spawns {
            if self.code.function(&spawn.function).is_none() {
                return Err(MachineError::UndefinedFunction {
                    name: spawn.function.clone(),
                });
            }
        }

        let key = self.thread_key(thread);
        for _ in 0..CAS_RETRIES {
            let Some((version, mut record)) = self.read_record::<StoredThread>(&key)? else {
                return Err(MachineError::UnknownThread { thread });
            };
            if record.committed == Some(token) {
                // Replay: finish the apply if a previous worker crashed
                // mid-way, otherwise a no-op.
                if record.pending.is_some() {
                    return self.apply_pending(thread, token);
                }
                return Ok(Vec::new());
            }
            match &record.lease {
                Some(hold) if hold.token == token => {}
                _ => return Err(MachineError::LeaseLost { thread }),
            }

            record.thread.state = state.clone();
            record.thread.status = match &outcome {
                StepOutcome::Yield => ThreadStatus::Ready,
                StepOutcome::Block(future) => ThreadStatus::Waiting(*future),
                StepOutcome::Finish(value) => ThreadStatus::Finished(value.clone()),
                StepOutcome::Fail(fault) => {
                    ThreadStatus::Errored(ErrorSignal::new(fault.clone(), thread))
                }
            };
            record.lease = None;
            record.committed = Some(token);
            record.pending = Some(PendingCommit {
                outcome: outcome.clone(),
                outbox: outbox.clone(),
            });

            match self.store.put(&key, Expect::Version(version), encode(&record)?) {
                Ok(_) => {
                    tracing::debug!(%thread, token, "step committed");
                    return self.apply_pending(thread, token);
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(err) => return Err(unavailable(err)),
            }
        }
        Err(MachineError::Unavailable {
            reason: format!("too much contention on {key}"),
        })
    }

    fn wake(&self, threads: &[ThreadId]) -> Result<(), MachineError> {
        let mut queue: Vec<ThreadId> = threads.to_vec();
        while let Some(id) = queue.pop() {
            queue.extend(self.wake_one(id)?);
        }
        Ok(())
    }

    fn resolve(&self, future: FutureId, value: Value) -> Result<Vec<ThreadId>, MachineError> {
        self.resolve_record(future, &value)?
            .ok_or(MachineError::DoubleResolve { future })
    }

    fn read_future(&self, future: FutureId) -> Result<Future, MachineError> {
        self.read_record::<Future>(&self.future_key(future))?
            .map(|(_, record)| record)
            .ok_or(MachineError::UnknownFuture { future })
    }

    fn thread_status(&self, thread: ThreadId) -> Result<ThreadStatus, MachineError> {
        self.read_record::<StoredThread>(&self.thread_key(thread))?
            .map(|(_, record)| record.thread.status)
            .ok_or(MachineError::UnknownThread { thread })
    }

    fn stdout(&self) -> Result<Vec<String>, MachineError> {
        let prefix = format!("{}/prints/", self.session);
        let keys = self.store.list(&prefix).map_err(unavailable)?;
        let mut lines = Vec::new();
        for key in keys {
            if let Some(versioned) = self.read_raw(&key)? {
                let chunk: Vec<String> = decode(&versioned.payload)?;
                lines.extend(chunk);
            }
        }
        Ok(lines)
    }

    fn snapshot(&self) -> Result<ControllerSnapshot, MachineError> {
        let mut threads = Vec::new();
        for id in self.thread_ids()? {
            if let Some((_, record)) = self.read_record::<StoredThread>(&self.thread_key(id))? {
                threads.push(record.thread);
            }
        }
        let prefix = format!("{}/futures/", self.session);
        let mut futures = Vec::new();
        for key in self.store.list(&prefix).map_err(unavailable)? {
            if let Some(versioned) = self.read_raw(&key)? {
                futures.push(decode::<Future>(&versioned.payload)?);
            }
        }
        Ok(ControllerSnapshot { threads, futures })
    }
}

fn encode<T: Serialize>(record: &T) -> Result<String, MachineError> {
    serde_json::to_string(record).map_err(|e| MachineError::Unavailable {
        reason: format!("record encoding failed: {e}"),
    })
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, MachineError> {
    serde_json::from_str(payload).map_err(|e| MachineError::Unavailable {
        reason: format!("record decoding failed: {e}"),
    })
}

fn unavailable(err: StoreError) -> MachineError {
    MachineError::Unavailable {
        reason: err.to_string(),
    }
}
