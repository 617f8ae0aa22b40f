use std::time::Duration;

use rpc_wire::ErrorCode;
use serde_json::Value;
use thiserror::Error;

use crate::schema::ValidationIssues;

/// Failure taxonomy for outbound calls and the peer's other fallible
/// operations. `ParseError` never reaches a caller — malformed inbound
/// frames are logged and dropped at the dispatch boundary.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("method '{method}' is not declared in the schema")]
    MethodNotFound { method: String },

    #[error("validation failed for '{method}': {issues}")]
    ValidationError {
        method: String,
        issues: ValidationIssues,
    },

    #[error("call to '{method}' timed out after {timeout:?}")]
    TimeoutError { method: String, timeout: Duration },

    #[error("remote error {code} calling '{method}': {message}")]
    RemoteError {
        method: String,
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("malformed wire frame: {0}")]
    ParseError(String),
}

impl PeerError {
    /// The JSON-RPC-compatible error code for this failure, used when a
    /// `PeerError` must be turned back into an outbound `rpc:error` frame.
    pub fn code(&self) -> i32 {
        match self {
            PeerError::ConnectionClosed => ErrorCode::ConnectionClosed.as_i32(),
            PeerError::MethodNotFound { .. } => ErrorCode::MethodNotFound.as_i32(),
            PeerError::ValidationError { .. } => ErrorCode::ValidationError.as_i32(),
            PeerError::TimeoutError { .. } => ErrorCode::Timeout.as_i32(),
            PeerError::RemoteError { code, .. } => *code,
            PeerError::ParseError(_) => ErrorCode::ParseError.as_i32(),
        }
    }
}
