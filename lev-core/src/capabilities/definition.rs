//! Capability definitions and the handler contract
//!
//! A capability is a named, schema-described unit of callable behaviour. The
//! handler only ever sees arguments that already passed schema validation and
//! had defaults filled in.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Handler invoked by the registry after validation
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Run the capability with validated, defaulted arguments
    async fn call(&self, args: Value) -> anyhow::Result<Value>;

    /// Lightweight no-argument self-test used by health checks
    ///
    /// Default implementation reports healthy.
    async fn self_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared handler reference
pub type SharedHandler = Arc<dyn CapabilityHandler>;

type HandlerFn = dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// Adapter turning an async closure into a [`CapabilityHandler`]
pub struct FnHandler {
    func: Box<HandlerFn>,
}

impl FnHandler {
    /// Wrap a closure returning a future
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            func: Box::new(move |args| Box::pin(func(args))),
        }
    }

    /// Wrap a closure and return it as a shared handler
    pub fn shared<F, Fut>(func: F) -> SharedHandler
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Arc::new(Self::new(func))
    }
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl CapabilityHandler for FnHandler {
    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        (self.func)(args).await
    }
}

/// Everything needed to register a capability
#[derive(Clone)]
pub struct CapabilityDefinition {
    /// Unique capability name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Raw input schema, parsed at registration
    pub input_schema: Value,

    /// Handler invoked on dispatch
    pub handler: SharedHandler,
}

impl CapabilityDefinition {
    /// Create a definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: SharedHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }

    /// Build a definition from a declarative manifest plus a handler
    ///
    /// The manifest must carry string `name` and `description` fields and may
    /// carry `inputSchema` (or `input_schema`). Returns a reason string when the
    /// manifest does not match the contract.
    pub fn from_manifest(manifest: &Value, handler: Option<SharedHandler>) -> Result<Self, String> {
        let object = manifest
            .as_object()
            .ok_or_else(|| "manifest must be an object".to_string())?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| "manifest is missing a string \"name\"".to_string())?;

        let description = object
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("manifest '{}' is missing a string \"description\"", name))?;

        let input_schema = object
            .get("inputSchema")
            .or_else(|| object.get("input_schema"))
            .cloned()
            .unwrap_or(Value::Null);

        let handler = handler.ok_or_else(|| format!("no handler bound for capability '{}'", name))?;

        Ok(Self::new(name, description, input_schema, handler))
    }
}

impl std::fmt::Debug for CapabilityDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Listing entry for a registered capability (handler excluded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    /// Capability name
    pub name: String,
    /// Capability description
    pub description: String,
    /// Input schema exactly as registered
    pub input_schema: Value,
}
