//! Domain Records
//!
//! Strongly-typed snapshots decoded from a single dynamic reply. Each record
//! has its own `from_value` decoder that checks every field's underlying type
//! before assigning it.
//!
//! # Absent vs. mistyped
//!
//! Some daemon versions omit unset fields instead of sending nil. Decoders that
//! allow optional fields treat a missing key and a nil value the same way (the
//! field keeps its zero value), but a key that is present with the wrong type
//! is always a [`DecodeError`]. No partial record is ever returned.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::DecodeError;
use crate::value::Value;

/// Scalar types a reply field can be decoded into
pub(crate) trait FromValue: Sized + Default {
    /// Type name used in diagnostics
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

/// Decode a whole reply as a single scalar
pub(crate) fn decode_scalar<T: FromValue>(
    value: &Value,
    record: &'static str,
) -> Result<T, DecodeError> {
    T::from_value(value).ok_or_else(|| DecodeError::WrongType {
        record,
        field: "reply".to_string(),
        expected: T::EXPECTED,
        found: value.type_name(),
    })
}

fn expect_struct<'a>(
    value: &'a Value,
    record: &'static str,
) -> Result<&'a BTreeMap<String, Value>, DecodeError> {
    value.as_struct().ok_or_else(|| DecodeError::WrongType {
        record,
        field: "reply".to_string(),
        expected: "struct",
        found: value.type_name(),
    })
}

fn expect_array<'a>(
    value: &'a Value,
    record: &'static str,
    field: &str,
) -> Result<&'a [Value], DecodeError> {
    value.as_array().ok_or_else(|| DecodeError::WrongType {
        record,
        field: field.to_string(),
        expected: "array",
        found: value.type_name(),
    })
}

fn expect_arity<'a>(
    value: &'a Value,
    record: &'static str,
    expected: usize,
) -> Result<&'a [Value], DecodeError> {
    let items = expect_array(value, record, "reply")?;
    if items.len() != expected {
        return Err(DecodeError::WrongArity {
            record,
            expected,
            found: items.len(),
        });
    }
    Ok(items)
}

fn element<T: FromValue>(value: &Value, record: &'static str, index: usize) -> Result<T, DecodeError> {
    T::from_value(value).ok_or_else(|| DecodeError::WrongType {
        record,
        field: format!("[{index}]"),
        expected: T::EXPECTED,
        found: value.type_name(),
    })
}

fn required<T: FromValue>(
    members: &BTreeMap<String, Value>,
    record: &'static str,
    field: &'static str,
) -> Result<T, DecodeError> {
    match members.get(field) {
        None | Some(Value::Nil) => Err(DecodeError::MissingField { record, field }),
        Some(value) => T::from_value(value).ok_or_else(|| DecodeError::WrongType {
            record,
            field: field.to_string(),
            expected: T::EXPECTED,
            found: value.type_name(),
        }),
    }
}

fn optional<T: FromValue>(
    members: &BTreeMap<String, Value>,
    record: &'static str,
    field: &'static str,
) -> Result<T, DecodeError> {
    match members.get(field) {
        Some(value) if !value.is_nil() => required(members, record, field),
        _ => Ok(T::default()),
    }
}

fn string_list(value: &Value, record: &'static str, field: &str) -> Result<Vec<String>, DecodeError> {
    expect_array(value, record, field)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            String::from_value(item).ok_or_else(|| DecodeError::WrongType {
                record,
                field: format!("{field}[{i}]"),
                expected: "string",
                found: item.type_name(),
            })
        })
        .collect()
}

// =============================================================================
// SupervisorState
// =============================================================================

/// The daemon's own operating mode
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupervisorState {
    /// Numeric state code (e.g. 1 for RUNNING)
    pub code: i64,
    /// State name (e.g. "RUNNING")
    pub name: String,
}

impl SupervisorState {
    const RECORD: &'static str = "SupervisorState";

    /// Decode from a `{statecode, statename}` mapping
    ///
    /// # Errors
    ///
    /// Both keys are required.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let members = expect_struct(value, Self::RECORD)?;
        Ok(Self {
            code: required(members, Self::RECORD, "statecode")?,
            name: required(members, Self::RECORD, "statename")?,
        })
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SupervisorState{{{}, \"{}\"}}", self.code, self.name)
    }
}

// =============================================================================
// ProcessInfo
// =============================================================================

/// Full descriptor of one managed process
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    /// Process name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Group the process belongs to
    pub group: String,
    /// Start time, epoch seconds
    pub start: i64,
    /// Stop time, epoch seconds
    pub stop: i64,
    /// Daemon clock at reply time, epoch seconds
    pub now: i64,
    /// Numeric process state
    pub state: i64,
    /// Process state name
    pub state_name: String,
    /// Last spawn error, empty if none
    pub spawn_err: String,
    /// Exit status of the last run
    pub exit_status: i64,
    /// Combined log file path
    pub logfile: String,
    /// Stdout log file path
    pub stdout_logfile: String,
    /// Stderr log file path
    pub stderr_logfile: String,
    /// Process id, 0 if not running
    pub pid: i64,
}

impl ProcessInfo {
    const RECORD: &'static str = "ProcessInfo";

    /// Decode from a process info mapping
    ///
    /// Missing or nil keys leave fields at their zero value. Unknown keys are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails if the reply is not a mapping or a known key has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let m = expect_struct(value, Self::RECORD)?;
        let r = Self::RECORD;
        Ok(Self {
            name: optional(m, r, "name")?,
            description: optional(m, r, "description")?,
            group: optional(m, r, "group")?,
            start: optional(m, r, "start")?,
            stop: optional(m, r, "stop")?,
            now: optional(m, r, "now")?,
            state: optional(m, r, "state")?,
            state_name: optional(m, r, "statename")?,
            spawn_err: optional(m, r, "spawnerr")?,
            exit_status: optional(m, r, "exitstatus")?,
            logfile: optional(m, r, "logfile")?,
            stdout_logfile: optional(m, r, "stdout_logfile")?,
            stderr_logfile: optional(m, r, "stderr_logfile")?,
            pid: optional(m, r, "pid")?,
        })
    }

    /// Decode a sequence of process info mappings, preserving order
    ///
    /// # Errors
    ///
    /// Fails on the first element that does not decode.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, DecodeError> {
        expect_array(value, Self::RECORD, "reply")?
            .iter()
            .map(Self::from_value)
            .collect()
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessInfo{{\"{}\", {}, \"{}\"}}",
            self.name, self.pid, self.state_name
        )
    }
}

// =============================================================================
// ProcessStatus
// =============================================================================

/// Per-process outcome of a start-all or stop-all request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    /// Process name
    pub name: String,
    /// Outcome description
    pub description: String,
    /// Group the process belongs to
    pub group: String,
    /// Numeric outcome code
    pub status: i64,
}

impl ProcessStatus {
    const RECORD: &'static str = "ProcessStatus";

    /// Decode from a `{name, description, group, status}` mapping
    ///
    /// # Errors
    ///
    /// All four keys are required.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let m = expect_struct(value, Self::RECORD)?;
        Ok(Self {
            name: required(m, Self::RECORD, "name")?,
            description: required(m, Self::RECORD, "description")?,
            group: required(m, Self::RECORD, "group")?,
            status: required(m, Self::RECORD, "status")?,
        })
    }

    /// Decode a sequence of status mappings, preserving order
    ///
    /// # Errors
    ///
    /// Fails on the first element that does not decode.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, DecodeError> {
        expect_array(value, Self::RECORD, "reply")?
            .iter()
            .map(Self::from_value)
            .collect()
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessStatus(\"{}\", {})", self.name, self.status)
    }
}

// =============================================================================
// ProcessTail
// =============================================================================

/// Result of a bounded log tail
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessTail {
    /// Log bytes read
    pub log: String,
    /// Offset to pass to the next tail call
    pub offset: i64,
    /// Whether the log grew past the requested window
    pub overflow: bool,
}

impl ProcessTail {
    const RECORD: &'static str = "ProcessTail";

    /// Decode from a `[log, offset, overflow]` triple
    ///
    /// # Errors
    ///
    /// Fails unless the reply has exactly three elements of the right types.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let items = expect_arity(value, Self::RECORD, 3)?;
        Ok(Self {
            log: element(&items[0], Self::RECORD, 0)?,
            offset: element(&items[1], Self::RECORD, 1)?,
            overflow: element(&items[2], Self::RECORD, 2)?,
        })
    }
}

impl fmt::Display for ProcessTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.log)
    }
}

// =============================================================================
// ReloadInfo
// =============================================================================

/// Process names affected by a configuration reload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReloadInfo {
    /// Newly configured names
    pub added: Vec<String>,
    /// Names whose configuration changed
    pub changed: Vec<String>,
    /// Names no longer configured
    pub removed: Vec<String>,
}

impl ReloadInfo {
    const RECORD: &'static str = "ReloadInfo";

    /// Decode from `[[added...], [changed...], [removed...]]` wrapped in one
    /// outer sequence
    ///
    /// # Errors
    ///
    /// The outer sequence must hold exactly one element and the inner one
    /// exactly three string sequences.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let outer = expect_arity(value, Self::RECORD, 1)?;
        let lists = expect_arity(&outer[0], Self::RECORD, 3)?;
        Ok(Self {
            added: string_list(&lists[0], Self::RECORD, "added")?,
            changed: string_list(&lists[1], Self::RECORD, "changed")?,
            removed: string_list(&lists[2], Self::RECORD, "removed")?,
        })
    }
}

impl fmt::Display for ReloadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added: {}, changed: {}, removed: {}",
            self.added.len(),
            self.changed.len(),
            self.removed.len()
        )
    }
}
