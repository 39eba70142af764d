//! Error types for state synchronization.

use thiserror::Error;

use crate::Pointer;

/// Errors raised while parsing pointers, applying patches, or syncing state.
///
/// These are deliberately distinct from protocol violations: a failed patch
/// means the producer sent a delta the committed state cannot absorb, not
/// that the event stream itself was malformed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The pointer string is not valid RFC 6901 syntax.
    #[error("invalid JSON pointer: {pointer:?}")]
    PointerSyntax {
        /// The offending pointer text.
        pointer: String,
    },

    /// The addressed location does not exist in the document.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The full pointer that failed to resolve.
        path: Pointer,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        /// The full pointer that failed to resolve.
        path: Pointer,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// The document shape does not match what the operation requires.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The full pointer being resolved.
        path: Pointer,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// An RFC 6902 `test` operation did not match.
    #[error("test failed at {path}")]
    TestFailed {
        /// The tested location.
        path: Pointer,
    },

    /// The operation is structurally invalid for the document.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },

    /// A state delta arrived before any state snapshot.
    #[error("state delta received before any state snapshot")]
    NoState,

    /// A delta entry could not be parsed as an RFC 6902 operation.
    #[error("malformed patch operation: {0}")]
    MalformedPatch(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        SyncError::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Get the type name of a JSON value.
pub(crate) fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
