//! Dynamic Values
//!
//! The daemon replies with self-describing, weakly-typed data: scalars, ordered
//! sequences and string-keyed mappings. [`Value`] is the in-memory form of that
//! data. Call channels produce it, argument builders consume it, and the record
//! decoders in [`crate::records`] turn it into typed structs.

use std::collections::BTreeMap;

/// A dynamically typed RPC value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Integer (`i4`, `int` and `i8` on the wire)
    Int(i64),
    /// Boolean
    Bool(bool),
    /// String (also the default for untyped values)
    String(String),
    /// Floating point
    Double(f64),
    /// ISO 8601 timestamp, kept verbatim
    DateTime(String),
    /// Binary payload
    Base64(Vec<u8>),
    /// Ordered heterogeneous sequence
    Array(Vec<Value>),
    /// String-keyed mapping
    Struct(BTreeMap<String, Value>),
    /// Explicit nil marker
    Nil,
}

impl Value {
    /// Name of the underlying type, used in decode diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Bool(_) => "boolean",
            Self::String(_) => "string",
            Self::Double(_) => "double",
            Self::DateTime(_) => "dateTime",
            Self::Base64(_) => "base64",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
            Self::Nil => "nil",
        }
    }

    /// Borrow as a string slice if this is a `String`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer if this is an `Int`
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the boolean if this is a `Bool`
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the elements if this is an `Array`
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the members if this is a `Struct`
    #[must_use]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Check for the nil marker
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(members: BTreeMap<String, Value>) -> Self {
        Self::Struct(members)
    }
}
