//! Machine-level errors.
//!
//! These are conditions of the runtime itself, not of the program: a user
//! program never observes them. Program-level failures are
//! [`Fault`](hark_types::Fault)s and travel as error values through futures.

use hark_types::{FutureId, ThreadId};

/// Errors from controller, loader, and driver operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    /// A commit arrived with a stale or foreign lease token.
    #[error("lease lost for {thread}")]
    LeaseLost {
        /// Thread whose lease was voided.
        thread: ThreadId,
    },
    /// A future was resolved a second time.
    #[error("future {future} is already resolved")]
    DoubleResolve {
        /// The twice-resolved future.
        future: FutureId,
    },
    /// The controller's backing store could not complete an operation.
    #[error("controller unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
    /// A code image failed static validation.
    #[error("malformed code: {reason}")]
    MalformedCode {
        /// Description of the validation failure.
        reason: String,
    },
    /// An operation referenced a thread the controller does not know.
    #[error("unknown thread {thread}")]
    UnknownThread {
        /// The unknown id.
        thread: ThreadId,
    },
    /// An operation referenced a future the controller does not know.
    #[error("unknown future {future}")]
    UnknownFuture {
        /// The unknown id.
        future: FutureId,
    },
    /// The configured thread limit was exceeded.
    #[error("max threads ({max}) exceeded")]
    TooManyThreads {
        /// Maximum allowed.
        max: usize,
    },
    /// A spawn named a function missing from the code image.
    #[error("spawn of undefined function {name}")]
    UndefinedFunction {
        /// The missing function name.
        name: String,
    },
}
