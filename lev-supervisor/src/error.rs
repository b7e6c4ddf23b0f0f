//! Error types for supervisor operations

use lev_core::error::{ErrorKind, ErrorResponse, IntoErrorResponse};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error types for supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The process could not be launched
    #[error("Failed to start '{command}' in {}: {reason}", cwd.display())]
    Spawn {
        command: String,
        cwd: PathBuf,
        reason: String,
    },

    /// No record exists for the process id
    #[error("Process '{0}' not found")]
    UnknownProcess(String),

    /// The operation needs a stopped process
    #[error("Process '{0}' is still running")]
    StillRunning(String),

    /// State or log file I/O failed
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Corrupt process record at {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The requested signal name is not recognised
    #[error("Unknown signal '{0}'")]
    InvalidSignal(String),

    /// The OS refused to deliver a signal
    #[error("Failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// The operation is not available on this platform
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl SupervisorError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SupervisorError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn spawn(
        command: impl Into<String>,
        cwd: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        SupervisorError::Spawn {
            command: command.into(),
            cwd: cwd.into(),
            reason: reason.into(),
        }
    }
}

impl IntoErrorResponse for SupervisorError {
    fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::Spawn { .. } => ErrorKind::Spawn,
            SupervisorError::UnknownProcess(_) => ErrorKind::UnknownProcess,
            SupervisorError::Storage { .. } | SupervisorError::Serialization { .. } => {
                ErrorKind::Storage
            }
            SupervisorError::InvalidSignal(_) | SupervisorError::StillRunning(_) => {
                ErrorKind::Validation
            }
            SupervisorError::Signal { .. } | SupervisorError::Unsupported(_) => ErrorKind::Handler,
        }
    }

    fn to_response(&self) -> ErrorResponse {
        let detail = match self {
            SupervisorError::Spawn { command, cwd, reason } => {
                json!({ "command": command, "cwd": cwd, "reason": reason })
            }
            SupervisorError::UnknownProcess(id) | SupervisorError::StillRunning(id) => {
                json!({ "processId": id })
            }
            SupervisorError::Storage { path, .. } | SupervisorError::Serialization { path, .. } => {
                json!({ "path": path })
            }
            SupervisorError::InvalidSignal(signal) => json!({ "signal": signal }),
            SupervisorError::Signal { pid, .. } => json!({ "pid": pid }),
            SupervisorError::Unsupported(operation) => json!({ "operation": operation }),
        };

        ErrorResponse::new(self.kind(), self.to_string()).with_detail(detail)
    }
}
