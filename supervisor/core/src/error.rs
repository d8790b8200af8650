//! Error Types
//!
//! Three layers of failure:
//! - [`CallError`]: what a call channel reports for one invocation
//! - [`DecodeError`]: a reply did not have the shape a decoder expects
//! - [`SupervisorError`]: what client operations return to callers

use thiserror::Error;

/// Failure reported by a call channel for a single invocation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The connection could not be made or broke mid-exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// The HTTP layer answered with a non-success status
    #[error("Unexpected HTTP status {status}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
    },

    /// The daemon answered with an RPC fault
    #[error("Fault {code}: {message}")]
    Fault {
        /// Numeric fault code
        code: i64,
        /// Fault description
        message: String,
    },

    /// The reply body could not be parsed
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The channel was closed before the call
    #[error("Channel closed")]
    Closed,
}

/// A reply did not match the structure a decoder expects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required mapping key was absent or nil
    #[error("{record}: missing required field `{field}`")]
    MissingField {
        /// Record being decoded
        record: &'static str,
        /// Missing key
        field: &'static str,
    },

    /// A value was present but of the wrong underlying type
    #[error("{record}: `{field}` expected {expected}, found {found}")]
    WrongType {
        /// Record being decoded
        record: &'static str,
        /// Key or position of the offending value
        field: String,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        found: &'static str,
    },

    /// A positional sequence had the wrong number of elements
    #[error("{record}: expected {expected} elements, found {found}")]
    WrongArity {
        /// Record being decoded
        record: &'static str,
        /// Required element count
        expected: usize,
        /// Actual element count
        found: usize,
    },
}

/// Errors returned by [`crate::SupervisorClient`]
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The transport could not be established
    #[error("Failed to connect to {target}: {reason}")]
    ConnectionFailed {
        /// Target as given by the caller
        target: String,
        /// What went wrong
        reason: String,
    },

    /// The peer speaks a different API version
    #[error("Want supervisor API version {expected}, got {actual} instead")]
    IncompatibleVersion {
        /// Version this client understands
        expected: &'static str,
        /// Version the peer reported
        actual: String,
    },

    /// The channel reported a failure for one invocation
    #[error("Call to {method} failed: {source}")]
    RemoteCallFailed {
        /// Remote method name
        method: String,
        /// Channel-level failure
        #[source]
        source: CallError,
    },

    /// The reply could not be decoded into the expected type
    #[error("Could not decode reply of {method}: {source}")]
    DecodeFailed {
        /// Remote method name
        method: String,
        /// Decoder failure
        #[source]
        source: DecodeError,
    },

    /// The client was closed
    #[error("Client is closed")]
    Closed,
}

impl SupervisorError {
    /// The RPC fault code, if the daemon answered with a fault
    #[must_use]
    pub fn fault_code(&self) -> Option<i64> {
        match self {
            Self::RemoteCallFailed {
                source: CallError::Fault { code, .. },
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_code_only_for_faults() {
        let fault = SupervisorError::RemoteCallFailed {
            method: "supervisor.startProcess".into(),
            source: CallError::Fault {
                code: 10,
                message: "BAD_NAME: foo".into(),
            },
        };
        assert_eq!(fault.fault_code(), Some(10));
        assert_eq!(SupervisorError::Closed.fault_code(), None);
    }

    #[test]
    fn test_display_includes_versions() {
        let err = SupervisorError::IncompatibleVersion {
            expected: "3.0",
            actual: "2.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Want supervisor API version 3.0, got 2.0 instead"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::WrongArity {
            record: "ProcessTail",
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "ProcessTail: expected 3 elements, found 2");
    }
}
