//! # Lev Core - capability registry for the Lev control plane
//!
//! Lev core provides the pieces every Lev surface shares:
//! - A dynamic capability registry with schema-validated dispatch
//! - Discovery from in-memory lists or manifest directories
//! - On-demand, per-capability health reporting
//! - Shared error kinds for structured responses
//! - Layered configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lev_core::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = CapabilityRegistry::new();
//!     registry
//!         .register(CapabilityDefinition::new(
//!             "echo",
//!             "Echo the arguments back",
//!             json!({ "properties": { "message": { "type": "string", "required": true } } }),
//!             FnHandler::shared(|args| async move { Ok(args) }),
//!         ))
//!         .await?;
//!
//!     let reply = registry.dispatch("echo", json!({ "message": "hi" })).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod config;
pub mod error;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capabilities::{
        CapabilityDefinition, CapabilityHandler, CapabilityRegistry, CapabilitySource,
        CapabilitySummary, DiscoveryReport, FnHandler, ManifestDirectory, RegistryError,
        RegistryHealth, RegistryResult, SharedHandler, StaticSource,
    };
    pub use crate::config::LevConfig;
    pub use crate::error::{ErrorKind, ErrorResponse, IntoErrorResponse};
}
