//! Error type for registry operations

use crate::error::{ErrorKind, ErrorResponse, IntoErrorResponse};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors raised while registering or dispatching capabilities
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A capability with this name is already registered
    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    /// The input schema is malformed
    #[error("Invalid schema for capability '{capability}' at '{property}': {reason}")]
    InvalidSchema {
        /// Capability being registered
        capability: String,
        /// Offending property (or `<schema>` for the schema root)
        property: String,
        /// What is wrong with it
        reason: String,
    },

    /// The definition does not match the capability contract
    #[error("Invalid capability definition '{capability}': {reason}")]
    InvalidDefinition {
        /// Capability name as declared (may be empty)
        capability: String,
        /// What is wrong with it
        reason: String,
    },

    /// No capability is registered under this name
    #[error("Capability '{0}' not found")]
    UnknownCapability(String),

    /// Arguments failed schema validation; the handler was not invoked
    #[error("Invalid argument '{property}' for capability '{capability}': expected {expected}, {message}")]
    Validation {
        /// Capability being dispatched
        capability: String,
        /// Offending property
        property: String,
        /// Expected type or constraint
        expected: String,
        /// What was found instead
        message: String,
    },

    /// The handler returned an error
    #[error("Capability '{capability}' failed: {source}")]
    Handler {
        /// Capability whose handler failed
        capability: String,
        /// Underlying cause
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl RegistryError {
    /// Wrap a handler failure
    ///
    /// A handler that failed with an [`ErrorResponse`] keeps its kind.
    pub fn handler(capability: impl Into<String>, err: anyhow::Error) -> Self {
        let source: Arc<dyn std::error::Error + Send + Sync> = match err.downcast::<ErrorResponse>() {
            Ok(response) => Arc::new(response),
            Err(err) => {
                let boxed: Box<dyn std::error::Error + Send + Sync> = err.into();
                Arc::from(boxed)
            }
        };
        Self::Handler {
            capability: capability.into(),
            source,
        }
    }

    fn typed_failure(&self) -> Option<&ErrorResponse> {
        match self {
            RegistryError::Handler { source, .. } => source.downcast_ref::<ErrorResponse>(),
            _ => None,
        }
    }

    /// Name of the capability this error refers to
    pub fn capability(&self) -> &str {
        match self {
            RegistryError::DuplicateCapability(name) | RegistryError::UnknownCapability(name) => {
                name
            }
            RegistryError::InvalidSchema { capability, .. }
            | RegistryError::InvalidDefinition { capability, .. }
            | RegistryError::Validation { capability, .. }
            | RegistryError::Handler { capability, .. } => capability,
        }
    }
}

impl IntoErrorResponse for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateCapability(_) => ErrorKind::Duplicate,
            RegistryError::InvalidSchema { .. } | RegistryError::InvalidDefinition { .. } => {
                ErrorKind::InvalidSchema
            }
            RegistryError::UnknownCapability(_) => ErrorKind::UnknownCapability,
            RegistryError::Validation { .. } => ErrorKind::Validation,
            RegistryError::Handler { .. } => self
                .typed_failure()
                .map(|response| response.kind)
                .unwrap_or(ErrorKind::Handler),
        }
    }

    fn to_response(&self) -> ErrorResponse {
        if let Some(response) = self.typed_failure() {
            let mut response = response.clone();
            if let Value::Object(detail) = &mut response.detail {
                detail
                    .entry("capability")
                    .or_insert_with(|| Value::String(self.capability().to_string()));
            }
            return response;
        }

        let detail = match self {
            RegistryError::InvalidSchema {
                capability,
                property,
                reason,
            } => json!({ "capability": capability, "property": property, "reason": reason }),
            RegistryError::Validation {
                capability,
                property,
                expected,
                ..
            } => json!({ "capability": capability, "property": property, "expected": expected }),
            RegistryError::Handler { capability, source } => {
                json!({ "capability": capability, "cause": source.to_string() })
            }
            other => json!({ "capability": other.capability() }),
        };

        ErrorResponse::new(self.kind(), self.to_string()).with_detail(detail)
    }
}
