//! Integration tests for the capabilities module

use super::*;
use crate::error::{ErrorKind, IntoErrorResponse};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Handler that counts calls and records the last arguments
#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
    last_args: std::sync::Mutex<Option<Value>>,
}

impl CountingHandler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_args(&self) -> Option<Value> {
        self.last_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityHandler for CountingHandler {
    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args.clone());
        Ok(json!({ "echo": args }))
    }
}

/// Handler whose self-check fails or panics on demand
struct FlakyHandler {
    mode: &'static str,
}

#[async_trait]
impl CapabilityHandler for FlakyHandler {
    async fn call(&self, _args: Value) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    async fn self_check(&self) -> anyhow::Result<()> {
        match self.mode {
            "fail" => anyhow::bail!("backend unreachable"),
            "panic" => panic!("self-check exploded"),
            _ => Ok(()),
        }
    }
}

fn number_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "x": { "type": "number" },
            "label": { "type": "string", "default": "none" }
        },
        "required": ["x"]
    })
}

fn definition(name: &str, handler: SharedHandler) -> CapabilityDefinition {
    CapabilityDefinition::new(name, format!("{} capability", name), number_schema(), handler)
}

#[tokio::test]
async fn test_dispatch_invokes_handler_once_with_defaults() {
    let registry = CapabilityRegistry::new();
    let handler = Arc::new(CountingHandler::default());
    registry
        .register(definition("calc", handler.clone()))
        .await
        .unwrap();

    let result = registry.dispatch("calc", json!({ "x": 2 })).await.unwrap();

    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.last_args(), Some(json!({ "x": 2, "label": "none" })));
    assert_eq!(result, json!({ "echo": { "x": 2, "label": "none" } }));
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first() {
    let registry = CapabilityRegistry::new();
    let first = Arc::new(CountingHandler::default());
    let second = Arc::new(CountingHandler::default());

    registry.register(definition("calc", first.clone())).await.unwrap();
    let err = registry
        .register(definition("calc", second.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::DuplicateCapability(ref name) if name == "calc"));
    assert_eq!(err.kind(), ErrorKind::Duplicate);

    registry.dispatch("calc", json!({ "x": 1 })).await.unwrap();
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_unknown_capability_regardless_of_contents() {
    let registry = CapabilityRegistry::new();
    let err = registry.dispatch("nonexistent", json!({})).await.unwrap_err();
    assert!(matches!(err, RegistryError::UnknownCapability(ref name) if name == "nonexistent"));

    registry
        .register(definition("calc", Arc::new(CountingHandler::default())))
        .await
        .unwrap();
    let err = registry.dispatch("nonexistent", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCapability);
}

#[tokio::test]
async fn test_validation_failure_never_invokes_handler() {
    let registry = CapabilityRegistry::new();
    let handler = Arc::new(CountingHandler::default());
    registry.register(definition("calc", handler.clone())).await.unwrap();

    let err = registry
        .dispatch("calc", json!({ "x": "abc" }))
        .await
        .unwrap_err();

    match &err {
        RegistryError::Validation {
            capability,
            property,
            expected,
            ..
        } => {
            assert_eq!(capability, "calc");
            assert_eq!(property, "x");
            assert_eq!(expected, "number");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(handler.calls(), 0);

    let missing = registry.dispatch("calc", json!({})).await.unwrap_err();
    assert!(matches!(missing, RegistryError::Validation { ref property, .. } if property == "x"));

    let not_object = registry.dispatch("calc", json!([1, 2])).await.unwrap_err();
    assert!(
        matches!(not_object, RegistryError::Validation { ref property, .. } if property == ARGS_ROOT)
    );
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_additional_properties_policy() {
    let registry = CapabilityRegistry::new();
    let open = Arc::new(CountingHandler::default());
    let closed = Arc::new(CountingHandler::default());

    registry
        .register(CapabilityDefinition::new(
            "open",
            "Accepts extras",
            json!({ "properties": { "a": { "type": "string" } } }),
            open.clone(),
        ))
        .await
        .unwrap();
    registry
        .register(CapabilityDefinition::new(
            "closed",
            "Rejects extras",
            json!({ "properties": { "a": { "type": "string" } }, "additionalProperties": false }),
            closed.clone(),
        ))
        .await
        .unwrap();

    registry
        .dispatch("open", json!({ "a": "x", "extra": true }))
        .await
        .unwrap();
    assert_eq!(open.last_args(), Some(json!({ "a": "x", "extra": true })));

    let err = registry
        .dispatch("closed", json!({ "a": "x", "extra": true }))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation { ref property, .. } if property == "extra"));
    assert_eq!(closed.calls(), 0);
}

#[tokio::test]
async fn test_handler_failure_is_wrapped() {
    let registry = CapabilityRegistry::new();
    registry
        .register(CapabilityDefinition::new(
            "broken",
            "Always fails",
            Value::Null,
            FnHandler::shared(|_args| async move { anyhow::bail!("disk full") }),
        ))
        .await
        .unwrap();

    let err = registry.dispatch("broken", Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handler);
    assert!(err.to_string().contains("disk full"));

    let response = err.to_response();
    assert_eq!(response.detail["capability"], "broken");
}

#[tokio::test]
async fn test_handler_panic_is_wrapped() {
    let registry = CapabilityRegistry::new();
    registry
        .register(CapabilityDefinition::new(
            "boom",
            "Panics on null input",
            Value::Null,
            FnHandler::shared(|args| async move {
                if args.as_object().is_some_and(|map| map.is_empty()) {
                    panic!("handler exploded");
                }
                Ok(args)
            }),
        ))
        .await
        .unwrap();

    let err = registry.dispatch("boom", Value::Null).await.unwrap_err();
    assert!(matches!(err, RegistryError::Handler { ref capability, .. } if capability == "boom"));
    assert_eq!(err.kind(), ErrorKind::Handler);
    assert!(err.to_string().contains("handler panicked"));

    // The registry keeps serving after the panic
    assert_eq!(registry.len().await, 1);
    assert!(registry.health_check().await.is_healthy());
}

#[tokio::test]
async fn test_register_rejects_malformed_schema() {
    let registry = CapabilityRegistry::new();
    let err = registry
        .register(CapabilityDefinition::new(
            "bad",
            "Bad schema",
            json!({ "properties": { "x": { "type": "integer-ish" } } }),
            Arc::new(CountingHandler::default()),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::InvalidSchema { ref property, .. } if property == "x"));
    assert!(!registry.contains("bad").await);
}

#[tokio::test]
async fn test_register_rejects_empty_name() {
    let registry = CapabilityRegistry::new();
    let err = registry
        .register(CapabilityDefinition::new(
            "  ",
            "Nameless",
            Value::Null,
            Arc::new(CountingHandler::default()),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidDefinition { .. }));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_discover_registers_good_and_reports_bad() {
    let registry = CapabilityRegistry::new();
    let good = definition("good", Arc::new(CountingHandler::default()));
    let bad = CapabilityDefinition::new(
        "bad",
        "Malformed",
        json!({ "properties": "not-an-object" }),
        Arc::new(CountingHandler::default()),
    );
    let good2 = definition("good2", Arc::new(CountingHandler::default()));

    let source = StaticSource::from_definitions(vec![good, bad, good2]);
    let report = registry.discover(&source).await;

    assert_eq!(report.registered, vec!["good", "good2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, "static:bad");
    assert!(!report.is_complete());
    assert!(registry.contains("good").await);
    assert!(registry.contains("good2").await);
    assert!(!registry.contains("bad").await);
}

#[tokio::test]
async fn test_discover_reports_duplicates_and_rejected_candidates() {
    let registry = CapabilityRegistry::new();
    registry
        .register(definition("taken", Arc::new(CountingHandler::default())))
        .await
        .unwrap();

    let source = StaticSource::new(vec![
        DiscoveryCandidate::ready("a", definition("taken", Arc::new(CountingHandler::default()))),
        DiscoveryCandidate::rejected("b", "module did not export a handler"),
        DiscoveryCandidate::from_manifest("c", &json!({ "name": "nohandler", "description": "x" }), None),
    ]);

    let report = registry.discover(&source).await;
    assert!(report.registered.is_empty());
    let sources: Vec<_> = report.failed.iter().map(|f| f.source.as_str()).collect();
    assert_eq!(sources, vec!["a", "b", "c"]);
    assert!(report.failed[0].reason.contains("already registered"));
}

#[tokio::test]
async fn test_manifest_directory_discovery() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("a_echo.json"),
        r#"{ "name": "echo", "description": "Echo", "inputSchema": { "properties": { "m": { "type": "string" } } } }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b_ping.yaml"),
        "name: ping\ndescription: Ping\ninputSchema:\n  properties: {}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("c_broken.json"), "{ not json").unwrap();
    std::fs::write(
        dir.path().join("d_unbound.yml"),
        "name: unbound\ndescription: No handler\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let source = ManifestDirectory::new(dir.path())
        .with_handler("echo", Arc::new(CountingHandler::default()))
        .with_handler("ping", FnHandler::shared(|_| async { Ok(json!("pong")) }));

    let registry = CapabilityRegistry::new();
    let report = registry.discover(&source).await;

    assert_eq!(report.registered, vec!["echo", "ping"]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].source.ends_with("c_broken.json"));
    assert!(report.failed[0].reason.contains("invalid JSON"));
    assert!(report.failed[1].reason.contains("no handler"));

    assert_eq!(registry.dispatch("ping", Value::Null).await.unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_manifest_directory_missing_is_single_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = ManifestDirectory::new(dir.path().join("missing"));

    let report = CapabilityRegistry::new().discover(&source).await;
    assert!(report.registered.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("cannot read manifest directory"));
}

#[tokio::test]
async fn test_list_preserves_registration_order() {
    let registry = CapabilityRegistry::new();
    for name in ["zeta", "alpha", "mid"] {
        registry
            .register(definition(name, Arc::new(CountingHandler::default())))
            .await
            .unwrap();
    }

    let names: Vec<_> = registry.list().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);

    assert!(registry.unregister("alpha").await);
    assert!(!registry.unregister("alpha").await);
    let names: Vec<_> = registry.list().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["zeta", "mid"]);

    // Index stays consistent after removal
    registry.dispatch("mid", json!({ "x": 1 })).await.unwrap();

    let summary = registry.get_summary("zeta").await.unwrap();
    assert_eq!(summary.input_schema, number_schema());
}

#[tokio::test]
async fn test_summary_serializes_camel_case() {
    let registry = CapabilityRegistry::new();
    registry
        .register(definition("calc", Arc::new(CountingHandler::default())))
        .await
        .unwrap();

    let value = serde_json::to_value(registry.list().await).unwrap();
    assert_eq!(value[0]["name"], "calc");
    assert!(value[0].get("inputSchema").is_some());
}

#[tokio::test]
async fn test_concurrent_dispatch_does_not_block() {
    let registry = Arc::new(CapabilityRegistry::new());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        registry
            .register(CapabilityDefinition::new(
                "slow",
                "Waits until released",
                Value::Null,
                FnHandler::shared(move |_| {
                    let entered = Arc::clone(&entered);
                    let release = Arc::clone(&release);
                    async move {
                        entered.notify_one();
                        release.notified().await;
                        Ok(json!("done"))
                    }
                }),
            ))
            .await
            .unwrap();
    }

    let slow = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.dispatch("slow", Value::Null).await })
    };
    entered.notified().await;

    // Registration and dispatch complete while the slow handler is still parked
    tokio::time::timeout(Duration::from_secs(5), async {
        registry
            .register(definition("fast", Arc::new(CountingHandler::default())))
            .await
            .unwrap();
        registry.dispatch("fast", json!({ "x": 1 })).await.unwrap();
    })
    .await
    .expect("registry blocked behind a running handler");
    assert!(!slow.is_finished());

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), json!("done"));
}

#[tokio::test]
async fn test_health_check_isolates_failures() {
    let registry = CapabilityRegistry::new();
    registry
        .register(definition("ok", Arc::new(FlakyHandler { mode: "ok" })))
        .await
        .unwrap();
    registry
        .register(definition("failing", Arc::new(FlakyHandler { mode: "fail" })))
        .await
        .unwrap();
    registry
        .register(definition("panicking", Arc::new(FlakyHandler { mode: "panic" })))
        .await
        .unwrap();

    let health = registry.health_check().await;

    assert_eq!(health.total_capabilities, 3);
    assert_eq!(health.healthy_count, 1);
    assert!(!health.is_healthy());

    let unhealthy: Vec<_> = health
        .unhealthy_capabilities
        .iter()
        .map(|u| (u.name.as_str(), u.reason.as_str()))
        .collect();
    assert_eq!(unhealthy.len(), 2);
    assert_eq!(unhealthy[0].0, "failing");
    assert!(unhealthy[0].1.contains("backend unreachable"));
    assert_eq!(unhealthy[1], ("panicking", "self-check panicked"));
}

#[tokio::test]
async fn test_health_check_on_empty_registry() {
    let health = CapabilityRegistry::new().health_check().await;
    assert_eq!(health.total_capabilities, 0);
    assert!(health.is_healthy());
}
