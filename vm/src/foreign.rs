//! The foreign bridge: host procedures callable from machine code.
//!
//! Hosts register callables under qualified names with a declared arity.
//! Registration is explicit — there is no reflective discovery. A foreign
//! call runs to completion synchronously inside an executor step and must
//! not re-enter the controller; from the machine's point of view it is a
//! pure procedure from values to a value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hark_types::{Fault, Value};

/// A registered host procedure.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

struct HostEntry {
    arity: usize,
    func: HostFn,
}

/// Registry of host procedures keyed by qualified name.
#[derive(Default)]
pub struct ForeignRegistry {
    entries: BTreeMap<String, HostEntry>,
}

impl ForeignRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host procedure under a qualified name.
    ///
    /// Re-registering a name replaces the previous callable.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: usize, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            HostEntry {
                arity,
                func: Arc::new(func),
            },
        );
    }

    /// Declared arity of a registered procedure.
    #[must_use]
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.arity)
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Invoke a host procedure, enforcing arity.
    ///
    /// # Errors
    ///
    /// `UndefinedFunction` for an unregistered name, `ArityMismatch` for a
    /// wrong argument count, `ForeignError` when the host fails.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Fault> {
        let entry = self.entries.get(name).ok_or_else(|| Fault::UndefinedFunction {
            name: name.to_string(),
        })?;
        if args.len() != entry.arity {
            return Err(Fault::ArityMismatch {
                name: name.to_string(),
                expected: entry.arity,
                actual: args.len(),
            });
        }
        (entry.func)(args).map_err(|reason| Fault::ForeignError {
            name: name.to_string(),
            reason,
        })
    }
}

impl fmt::Debug for ForeignRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, e)| (name, e.arity)))
            .finish()
    }
}
