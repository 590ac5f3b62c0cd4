//! The code image: an instruction stream plus symbol tables.
//!
//! Immutable after seeding. The image is the unit the controller hands to
//! every executor, and the unit persisted in distributed mode, so it is
//! fully serializable. `validate` replaces compile-time guarantees with
//! checks performed before the image is ever executed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MachineError;
use crate::instr::Instr;

/// Symbol-table entry for a named function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnEntry {
    /// Index of the function's first instruction.
    pub entry: usize,
    /// Declared arity.
    pub arity: usize,
    /// Parameter names, bound to arguments on call.
    pub params: Vec<String>,
}

/// A foreign binding imported by the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignDecl {
    /// Qualified host name registered with the foreign bridge.
    pub target: String,
    /// Declared arity.
    pub arity: usize,
}

/// A compiled program: instructions, function table, foreign table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeImage {
    /// The instruction stream. Function bodies are contiguous blocks.
    pub instrs: Vec<Instr>,
    /// Function name → entry metadata.
    pub functions: BTreeMap<String, FnEntry>,
    /// Surface name → foreign binding.
    pub foreigns: BTreeMap<String, ForeignDecl>,
}

impl CodeImage {
    /// Look up a function entry.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FnEntry> {
        self.functions.get(name)
    }

    /// Check internal consistency before execution.
    ///
    /// Verifies that every function entry is in range with arity matching
    /// its parameter list, that every function block (entry up to the next
    /// entry) ends in `Return`, and that every jump lands inside the
    /// instruction stream.
    ///
    /// # Errors
    ///
    /// Returns `MachineError::MalformedCode` describing the first violation.
    pub fn validate(&self) -> Result<(), MachineError> {
        let malformed = |reason: String| MachineError::MalformedCode { reason };

        let mut entries: Vec<(usize, &str)> = Vec::with_capacity(self.functions.len());
        for (name, entry) in &self.functions {
            if entry.entry >= self.instrs.len() {
                return Err(malformed(format!(
                    "function {name} enters at {} but code ends at {}",
                    entry.entry,
                    self.instrs.len()
                )));
            }
            if entry.arity != entry.params.len() {
                return Err(malformed(format!(
                    "function {name} declares arity {} with {} parameter(s)",
                    entry.arity,
                    entry.params.len()
                )));
            }
            entries.push((entry.entry, name));
        }

        entries.sort_unstable();
        for (i, &(start, name)) in entries.iter().enumerate() {
            let end = entries
                .get(i + 1)
                .map_or(self.instrs.len(), |&(next, _)| next);
            if end == start || !matches!(self.instrs[end - 1], Instr::Return) {
                return Err(malformed(format!(
                    "function {name} does not end in Return"
                )));
            }
        }

        for (idx, instr) in self.instrs.iter().enumerate() {
            if let Instr::Jump { off } | Instr::JumpIfNot { off } = instr {
                let target = idx as i64 + 1 + i64::from(*off);
                if target < 0 || target >= self.instrs.len() as i64 {
                    return Err(malformed(format!(
                        "jump at {idx} targets {target}, outside 0..{}",
                        self.instrs.len()
                    )));
                }
            }
        }

        Ok(())
    }
}
