//! Capability discovery sources
//!
//! A [`CapabilitySource`] yields candidates; the registry registers each one
//! independently so a single bad candidate never blocks the rest.

use super::definition::{CapabilityDefinition, SharedHandler};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One candidate produced by a discovery source
#[derive(Debug)]
pub struct DiscoveryCandidate {
    /// Where the candidate came from (file path, module name, ...)
    pub source: String,

    /// The definition, or the reason the candidate does not match the contract
    pub definition: Result<CapabilityDefinition, String>,
}

impl DiscoveryCandidate {
    /// Candidate backed by an already-built definition
    pub fn ready(source: impl Into<String>, definition: CapabilityDefinition) -> Self {
        Self {
            source: source.into(),
            definition: Ok(definition),
        }
    }

    /// Candidate built from a declarative manifest
    pub fn from_manifest(
        source: impl Into<String>,
        manifest: &Value,
        handler: Option<SharedHandler>,
    ) -> Self {
        Self {
            source: source.into(),
            definition: CapabilityDefinition::from_manifest(manifest, handler),
        }
    }

    /// Candidate that could not be loaded at all
    pub fn rejected(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            definition: Err(reason.into()),
        }
    }
}

/// Something that can enumerate capability candidates
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Produce every candidate this source knows about
    async fn candidates(&self) -> Vec<DiscoveryCandidate>;
}

/// A candidate that failed to register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFailure {
    /// Where the candidate came from
    pub source: String,
    /// Why it was rejected
    pub reason: String,
}

/// Partial-success report returned by discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Names registered, in discovery order
    pub registered: Vec<String>,
    /// Candidates that were rejected
    pub failed: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    /// Whether every candidate registered
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fixed in-memory list of candidates
///
/// Candidates are consumed on first discovery; a second call yields nothing.
#[derive(Debug, Default)]
pub struct StaticSource {
    candidates: tokio::sync::Mutex<Vec<DiscoveryCandidate>>,
}

impl StaticSource {
    /// Create a source from candidates
    pub fn new(candidates: Vec<DiscoveryCandidate>) -> Self {
        Self {
            candidates: tokio::sync::Mutex::new(candidates),
        }
    }

    /// Create a source from ready definitions, labelled by name
    pub fn from_definitions(definitions: Vec<CapabilityDefinition>) -> Self {
        Self::new(
            definitions
                .into_iter()
                .map(|d| DiscoveryCandidate::ready(format!("static:{}", d.name), d))
                .collect(),
        )
    }
}

#[async_trait]
impl CapabilitySource for StaticSource {
    async fn candidates(&self) -> Vec<DiscoveryCandidate> {
        std::mem::take(&mut *self.candidates.lock().await)
    }
}

/// Directory of JSON/YAML manifests bound to handlers by name
///
/// Each `*.json`, `*.yaml` or `*.yml` file declares one capability:
///
/// ```yaml
/// name: start_dev_server
/// description: Start a development server
/// inputSchema:
///   properties:
///     projectPath: { type: string }
/// ```
pub struct ManifestDirectory {
    dir: PathBuf,
    handlers: HashMap<String, SharedHandler>,
}

impl ManifestDirectory {
    /// Create a source over a directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler to a capability name
    pub fn with_handler(mut self, name: impl Into<String>, handler: SharedHandler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    fn is_manifest(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json" | "yaml" | "yml")
        )
    }

    fn parse_manifest(path: &Path, contents: &str) -> Result<Value, String> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e)),
            _ => serde_yaml::from_str(contents).map_err(|e| format!("invalid YAML: {}", e)),
        }
    }

    async fn manifest_paths(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && Self::is_manifest(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl std::fmt::Debug for ManifestDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestDirectory")
            .field("dir", &self.dir)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl CapabilitySource for ManifestDirectory {
    async fn candidates(&self) -> Vec<DiscoveryCandidate> {
        let paths = match self.manifest_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                return vec![DiscoveryCandidate::rejected(
                    self.dir.display().to_string(),
                    format!("cannot read manifest directory: {}", e),
                )];
            }
        };

        debug!(dir = %self.dir.display(), count = paths.len(), "Scanning capability manifests");

        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            let source = path.display().to_string();
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) => {
                    candidates.push(DiscoveryCandidate::rejected(source, format!("cannot read manifest: {}", e)));
                    continue;
                }
            };

            let manifest = match Self::parse_manifest(&path, &contents) {
                Ok(manifest) => manifest,
                Err(reason) => {
                    candidates.push(DiscoveryCandidate::rejected(source, reason));
                    continue;
                }
            };

            let handler = manifest
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| self.handlers.get(name).cloned());

            candidates.push(DiscoveryCandidate::from_manifest(source, &manifest, handler));
        }

        candidates
    }
}
