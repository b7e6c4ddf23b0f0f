//! Capability registry: registration, discovery, dispatch and health
//!
//! The `CapabilityRegistry` provides:
//! - Registration with duplicate detection and schema checking
//! - Partial-success discovery from any [`CapabilitySource`]
//! - Dispatch by name with validation strictly before invocation
//! - Deterministic listing in registration order
//! - Per-capability isolated health checks
//!
//! # Example
//!
//! ```rust,ignore
//! use lev_core::capabilities::{CapabilityDefinition, CapabilityRegistry, FnHandler};
//!
//! let registry = CapabilityRegistry::new();
//! registry.register(CapabilityDefinition::new(
//!     "echo",
//!     "Echo the arguments back",
//!     json!({ "properties": { "message": { "type": "string", "required": true } } }),
//!     FnHandler::shared(|args| async move { Ok(args) }),
//! )).await?;
//!
//! let result = registry.dispatch("echo", json!({ "message": "hi" })).await?;
//! ```

use super::definition::{CapabilityDefinition, CapabilitySummary, SharedHandler};
use super::discovery::{CapabilitySource, DiscoveryFailure, DiscoveryReport};
use super::error::{RegistryError, RegistryResult};
use super::health::RegistryHealth;
use super::schema::InputSchema;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A capability after its definition passed registration checks
struct RegisteredCapability {
    name: String,
    description: String,
    raw_schema: Value,
    schema: InputSchema,
    handler: SharedHandler,
}

impl RegisteredCapability {
    fn summary(&self) -> CapabilitySummary {
        CapabilitySummary {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.raw_schema.clone(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Arc<RegisteredCapability>>,
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn get(&self, name: &str) -> Option<&Arc<RegisteredCapability>> {
        self.index.get(name).and_then(|&i| self.entries.get(i))
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.name.clone(), i))
            .collect();
    }
}

/// Registry mapping capability names to validated definitions
///
/// Safe to share across tasks: lookups take a read lock only long enough to
/// clone the entry, so concurrent dispatches never wait on each other's
/// handlers, and an insert is visible all at once or not at all.
#[derive(Default)]
pub struct CapabilityRegistry {
    state: RwLock<RegistryState>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.try_read() {
            Ok(state) => f
                .debug_struct("CapabilityRegistry")
                .field("capability_count", &state.entries.len())
                .field(
                    "capabilities",
                    &state.entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
                )
                .finish(),
            Err(_) => f.debug_struct("CapabilityRegistry").finish_non_exhaustive(),
        }
    }
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a definition against the capability contract and parse its schema
    fn check_definition(definition: CapabilityDefinition) -> RegistryResult<RegisteredCapability> {
        let name = definition.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidDefinition {
                capability: definition.name,
                reason: "name must not be empty".to_string(),
            });
        }

        let description = definition.description.trim().to_string();
        if description.is_empty() {
            return Err(RegistryError::InvalidDefinition {
                capability: name,
                reason: "description must not be empty".to_string(),
            });
        }

        let schema = InputSchema::parse(&definition.input_schema).map_err(|issue| {
            RegistryError::InvalidSchema {
                capability: name.clone(),
                property: issue.property,
                reason: issue.reason,
            }
        })?;

        Ok(RegisteredCapability {
            name,
            description,
            raw_schema: definition.input_schema,
            schema,
            handler: definition.handler,
        })
    }

    /// Register a capability
    ///
    /// Fails with [`RegistryError::DuplicateCapability`] when the name is
    /// taken and [`RegistryError::InvalidSchema`] when the schema is malformed.
    /// The existing registration is never replaced.
    pub async fn register(&self, definition: CapabilityDefinition) -> RegistryResult<()> {
        let entry = Self::check_definition(definition)?;

        let mut state = self.state.write().await;
        if state.index.contains_key(&entry.name) {
            return Err(RegistryError::DuplicateCapability(entry.name));
        }

        let name = entry.name.clone();
        let position = state.entries.len();
        state.entries.push(Arc::new(entry));
        state.index.insert(name.clone(), position);
        drop(state);

        info!(capability = %name, "Registered capability");
        Ok(())
    }

    /// Register every candidate a source yields
    ///
    /// Never fails as a whole: rejected candidates are reported in
    /// [`DiscoveryReport::failed`] and the rest are still registered.
    pub async fn discover(&self, source: &dyn CapabilitySource) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for candidate in source.candidates().await {
            let outcome = match candidate.definition {
                Ok(definition) => {
                    let name = definition.name.trim().to_string();
                    self.register(definition)
                        .await
                        .map(|()| name)
                        .map_err(|e| e.to_string())
                }
                Err(reason) => Err(reason),
            };

            match outcome {
                Ok(name) => report.registered.push(name),
                Err(reason) => {
                    warn!(source = %candidate.source, %reason, "Skipping capability candidate");
                    report.failed.push(DiscoveryFailure {
                        source: candidate.source,
                        reason,
                    });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "Capability discovery finished"
        );
        report
    }

    /// Remove a capability
    ///
    /// Returns `true` if it was registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(position) = state.index.get(name).copied() else {
            return false;
        };
        state.entries.remove(position);
        state.reindex();
        debug!(capability = %name, "Unregistered capability");
        true
    }

    /// Check if a capability is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.index.contains_key(name)
    }

    /// Number of registered capabilities
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Summary of one capability
    pub async fn get_summary(&self, name: &str) -> Option<CapabilitySummary> {
        self.state.read().await.get(name).map(|e| e.summary())
    }

    /// List all capabilities in registration order
    pub async fn list(&self) -> Vec<CapabilitySummary> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .map(|e| e.summary())
            .collect()
    }

    /// Validate arguments and invoke the named capability
    ///
    /// The handler runs only if validation passes, and receives the
    /// arguments with schema defaults filled in. Its result is returned
    /// unchanged; its failure, or a panic, is wrapped in
    /// [`RegistryError::Handler`].
    pub async fn dispatch(&self, name: &str, args: Value) -> RegistryResult<Value> {
        let entry = self
            .state
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCapability(name.to_string()))?;

        let args = entry
            .schema
            .validate(args)
            .map_err(|issue| RegistryError::Validation {
                capability: entry.name.clone(),
                property: issue.property,
                expected: issue.expected,
                message: issue.message,
            })?;

        debug!(capability = %entry.name, "Dispatching capability");

        let outcome = AssertUnwindSafe(entry.handler.call(args))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("handler panicked")));

        outcome.map_err(|e| {
            warn!(capability = %entry.name, error = %e, "Capability handler failed");
            RegistryError::handler(entry.name.clone(), e)
        })
    }

    /// Check every capability and aggregate the results
    ///
    /// Each check runs in its own task, so a failing or panicking self-check
    /// only marks its own capability unhealthy.
    pub async fn health_check(&self) -> RegistryHealth {
        let entries: Vec<Arc<RegisteredCapability>> = self.state.read().await.entries.clone();

        let checks = entries.iter().map(|entry| {
            let entry = Arc::clone(entry);
            tokio::spawn(async move {
                InputSchema::parse(&entry.raw_schema)
                    .map_err(|issue| format!("schema invalid at '{}': {}", issue.property, issue.reason))?;
                entry
                    .handler
                    .self_check()
                    .await
                    .map_err(|e| format!("self-check failed: {}", e))
            })
        });

        let outcomes = futures::future::join_all(checks).await;

        let mut health = RegistryHealth::default();
        for (entry, outcome) in entries.iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => Err("self-check panicked".to_string()),
                Err(join_error) => Err(format!("self-check did not complete: {}", join_error)),
            };
            health.record(&entry.name, outcome);
        }

        debug!(
            total = health.total_capabilities,
            healthy = health.healthy_count,
            "Registry health check complete"
        );
        health
    }
}
