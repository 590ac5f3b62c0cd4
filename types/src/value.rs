//! The tagged runtime value model.
//!
//! Values are immutable: every operation produces a new value. Function,
//! foreign, and future variants carry identifiers only — never pointers into
//! executor state — so a value survives suspension and remote transport
//! unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fault::{ErrorSignal, Fault};
use crate::ids::FutureId;

/// A resolvable reference to a named function in the code image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Function name as it appears in the symbol table.
    pub name: String,
    /// Declared arity.
    pub arity: usize,
}

/// A reference to a host procedure registered with the foreign bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    /// Qualified host name, e.g. `pysrc.main/random_sleep`.
    pub name: String,
    /// Declared arity, enforced by the bridge at call time.
    pub arity: usize,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Interned name.
    Symbol(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Symbol-keyed mapping; insertion order is irrelevant.
    Record(BTreeMap<String, Value>),
    /// Reference to a named machine function.
    Function(FunctionRef),
    /// Reference to a host procedure.
    Foreign(ForeignRef),
    /// Opaque handle to a future held by the controller.
    Future(FutureId),
    /// Distinguished error value, produced when a thread errors and flowed
    /// through `await` to its consumers.
    Error(Box<ErrorSignal>),
}

// Structural equality is total: NaN never arises from machine arithmetic
// (division by zero faults instead of producing non-finite floats).
impl Eq for Value {}

impl Value {
    /// Short variant name used in fault messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Function(_) => "function",
            Self::Foreign(_) => "foreign",
            Self::Future(_) => "future",
            Self::Error(_) => "error",
        }
    }

    /// Truthiness for conditionals: `Null` and `false` are falsy, everything
    /// else is truthy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    /// Whether this value is the distinguished error value.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    fn numeric_pair(&self, other: &Self, op: &str) -> Result<(Number, Number), Fault> {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(Fault::type_mismatch(
                format!("number for {op}"),
                self.type_name(),
            )),
            (_, None) => Err(Fault::type_mismatch(
                format!("number for {op}"),
                other.type_name(),
            )),
        }
    }

    /// `self + other`. Integers stay integral; any float operand widens both.
    pub fn add(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, "+")? {
            (Number::Int(a), Number::Int(b)) => Ok(Self::Int(a.wrapping_add(b))),
            (a, b) => Ok(Self::Float(a.as_f64() + b.as_f64())),
        }
    }

    /// `self - other`.
    pub fn sub(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, "-")? {
            (Number::Int(a), Number::Int(b)) => Ok(Self::Int(a.wrapping_sub(b))),
            (a, b) => Ok(Self::Float(a.as_f64() - b.as_f64())),
        }
    }

    /// `self * other`.
    pub fn mul(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, "*")? {
            (Number::Int(a), Number::Int(b)) => Ok(Self::Int(a.wrapping_mul(b))),
            (a, b) => Ok(Self::Float(a.as_f64() * b.as_f64())),
        }
    }

    /// `self / other`. Integer division truncates; a zero divisor faults.
    pub fn div(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, "/")? {
            (_, Number::Int(0)) => Err(Fault::DivisionByZero),
            (Number::Int(a), Number::Int(b)) => Ok(Self::Int(a.wrapping_div(b))),
            (a, b) => {
                let divisor = b.as_f64();
                if divisor == 0.0 {
                    return Err(Fault::DivisionByZero);
                }
                Ok(Self::Float(a.as_f64() / divisor))
            }
        }
    }

    /// Arithmetic negation.
    pub fn neg(&self) -> Result<Self, Fault> {
        match self {
            Self::Int(i) => Ok(Self::Int(i.wrapping_neg())),
            Self::Float(x) => Ok(Self::Float(-x)),
            other => Err(Fault::type_mismatch("number for neg", other.type_name())),
        }
    }

    /// `self < other` over numbers; mixed operands compare as floats.
    pub fn lt(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, "<")? {
            (Number::Int(a), Number::Int(b)) => Ok(Self::Bool(a < b)),
            (a, b) => Ok(Self::Bool(a.as_f64() < b.as_f64())),
        }
    }

    /// `self > other` over numbers; mixed operands compare as floats.
    pub fn gt(&self, other: &Self) -> Result<Self, Fault> {
        match self.numeric_pair(other, ">")? {
            (Number::Int(a), Number::Int(b)) => Ok(Self::Bool(a > b)),
            (a, b) => Ok(Self::Bool(a.as_f64() > b.as_f64())),
        }
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(x) => *x,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(s) => write!(f, ":{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Function(fr) => write!(f, "<fn {}/{}>", fr.name, fr.arity),
            Self::Foreign(fr) => write!(f, "<foreign {}/{}>", fr.name, fr.arity),
            Self::Future(id) => write!(f, "<future {id}>"),
            Self::Error(sig) => write!(f, "<error {sig}>"),
        }
    }
}
