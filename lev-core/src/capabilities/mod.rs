//! Dynamic capability registry
//!
//! Capabilities are named, schema-described async handlers. The registry
//! checks each definition when it is registered, validates arguments before
//! every dispatch, and reports per-capability health on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use lev_core::capabilities::{CapabilityDefinition, CapabilityRegistry, FnHandler};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), lev_core::capabilities::RegistryError> {
//! let registry = CapabilityRegistry::new();
//! registry
//!     .register(CapabilityDefinition::new(
//!         "greet",
//!         "Say hello",
//!         json!({ "properties": { "name": { "type": "string", "default": "world" } } }),
//!         FnHandler::shared(|args| async move {
//!             Ok(json!(format!("hello {}", args["name"].as_str().unwrap_or_default())))
//!         }),
//!     ))
//!     .await?;
//!
//! let greeting = registry.dispatch("greet", json!({})).await?;
//! assert_eq!(greeting, json!("hello world"));
//! # Ok(())
//! # }
//! ```

mod definition;
mod discovery;
mod error;
mod health;
mod registry;
mod schema;

pub use definition::{
    CapabilityDefinition, CapabilityHandler, CapabilitySummary, FnHandler, SharedHandler,
};
pub use discovery::{
    CapabilitySource, DiscoveryCandidate, DiscoveryFailure, DiscoveryReport, ManifestDirectory,
    StaticSource,
};
pub use error::{RegistryError, RegistryResult};
pub use health::{RegistryHealth, UnhealthyCapability};
pub use registry::CapabilityRegistry;
pub use schema::{
    ARGS_ROOT, ArgumentIssue, InputSchema, PropertySchema, SCHEMA_ROOT, SchemaIssue, SchemaKind,
    describe_value,
};

#[cfg(test)]
mod tests;
