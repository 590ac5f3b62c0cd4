//! Futures: write-once cells referenced by identifier.
//!
//! A future is created at each `async` (and one terminal future per thread).
//! It transitions exactly once from unresolved to resolved; the chain holds
//! the threads blocked awaiting it. Futures are never deleted during a run —
//! resolved values stay readable for the whole session so at-least-once
//! commit replays remain safe.

use serde::{Deserialize, Serialize};

use hark_types::{FutureId, ThreadId, Value};

/// A write-once result cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Future {
    /// Stable, monotonically assigned identifier.
    pub id: FutureId,
    /// Whether a value has been written.
    pub resolved: bool,
    /// The resolved value, if any.
    pub value: Option<Value>,
    /// Threads blocked awaiting this future. Cleared on resolution.
    pub chain: Vec<ThreadId>,
}

impl Future {
    /// Create an unresolved future.
    #[must_use]
    pub fn new(id: FutureId) -> Self {
        Self {
            id,
            resolved: false,
            value: None,
            chain: Vec::new(),
        }
    }

    /// Write the value, returning the drained chain of waiters.
    ///
    /// Returns `None` if the future was already resolved; the caller maps
    /// that to a double-resolve error without mutating anything.
    pub fn resolve(&mut self, value: Value) -> Option<Vec<ThreadId>> {
        if self.resolved {
            return None;
        }
        self.resolved = true;
        self.value = Some(value);
        Some(std::mem::take(&mut self.chain))
    }
}
