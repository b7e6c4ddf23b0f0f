//! Aggregate health report for the registry

use serde::{Deserialize, Serialize};

/// A capability that failed its health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyCapability {
    /// Capability name
    pub name: String,
    /// Why it is unhealthy
    pub reason: String,
}

/// Health of every registered capability, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    /// Number of capabilities checked
    pub total_capabilities: usize,
    /// Number that passed
    pub healthy_count: usize,
    /// Failures, in registration order
    pub unhealthy_capabilities: Vec<UnhealthyCapability>,
}

impl RegistryHealth {
    /// Whether every capability passed
    pub fn is_healthy(&self) -> bool {
        self.unhealthy_capabilities.is_empty()
    }

    pub(crate) fn record(&mut self, name: &str, outcome: Result<(), String>) {
        self.total_capabilities += 1;
        match outcome {
            Ok(()) => self.healthy_count += 1,
            Err(reason) => self.unhealthy_capabilities.push(UnhealthyCapability {
                name: name.to_string(),
                reason,
            }),
        }
    }
}
