//! Typed identifiers for threads and futures.
//!
//! Both are plain monotonically assigned numbers. They carry no pointers into
//! executor state, so a handle stays valid after suspension, serialization,
//! and transport to another worker. Allocation is the data controller's job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a machine thread (a lightweight continuation, not an OS
/// thread). Stable for the thread's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ThreadId(pub u64);

/// Identifier of a future: a write-once cell produced by `async` and
/// consumed by `await`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FutureId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}
