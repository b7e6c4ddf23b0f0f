//! Error kinds shared by the registry and the supervisor
//!
//! Every failure surfaced to a caller (CLI, RPC-style dispatch) is rendered as
//! an [`ErrorResponse`] carrying one of the [`ErrorKind`] values, so callers can
//! branch on the kind without parsing messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure category reported in dispatch responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No capability is registered under the requested name
    UnknownCapability,
    /// Arguments failed schema validation
    Validation,
    /// A capability with the same name is already registered
    Duplicate,
    /// A capability definition or its input schema is malformed
    InvalidSchema,
    /// The capability handler itself failed
    Handler,
    /// The OS refused to launch a process
    Spawn,
    /// No process record exists for the identifier
    UnknownProcess,
    /// Persisted state could not be read or written
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnknownCapability => "UnknownCapability",
            ErrorKind::Validation => "Validation",
            ErrorKind::Duplicate => "Duplicate",
            ErrorKind::InvalidSchema => "InvalidSchema",
            ErrorKind::Handler => "Handler",
            ErrorKind::Spawn => "Spawn",
            ErrorKind::UnknownProcess => "UnknownProcess",
            ErrorKind::Storage => "Storage",
        };
        f.write_str(name)
    }
}

/// Structured error returned in place of a handler result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Failure category
    pub kind: ErrorKind,

    /// Human-readable message including the offending identifier
    pub message: String,

    /// Machine-readable detail (capability name, property, process id, ...)
    #[serde(default)]
    pub detail: Value,
}

impl ErrorResponse {
    /// Create a response with an empty detail object
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: Value::Object(Default::default()),
        }
    }

    /// Attach machine-readable detail
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Handlers may fail with an `ErrorResponse` to keep their kind through dispatch
impl std::error::Error for ErrorResponse {}

/// Conversion implemented by every error type that can reach a caller
pub trait IntoErrorResponse {
    /// The kind this error is reported as
    fn kind(&self) -> ErrorKind;

    /// Render the error as a structured response
    fn to_response(&self) -> ErrorResponse;
}
