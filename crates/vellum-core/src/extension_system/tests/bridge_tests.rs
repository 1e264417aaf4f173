use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::tempdir;

use super::{make_registry, write_descriptor, TestModule};
use crate::extension_system::bridge::RouteBridge;
use crate::extension_system::error::ExtensionSystemError;
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::module::ExtensionRequest;

fn routed_manifest(slug: &str) -> Value {
    json!({
        "slug": slug,
        "serverRoutes": [
            { "method": "GET", "path": "/items" },
            { "method": "POST", "path": "/items" }
        ]
    })
}

fn request(method: &str, path: &str) -> ExtensionRequest {
    ExtensionRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: HashMap::new(),
        body: Value::Null,
    }
}

#[tokio::test]
async fn dispatches_to_an_active_extension() {
    let root = tempdir().unwrap();
    let harness = make_registry(ExtensionKind::Plugin, root.path());
    write_descriptor(root.path(), "shop", ExtensionKind::Plugin, &routed_manifest("shop"));
    harness
        .loader
        .put("shop", Arc::new(TestModule::new(routed_manifest("shop"))));

    harness
        .registry
        .register_from_dir(&root.path().join("shop"), true)
        .await
        .unwrap();

    let bridge = RouteBridge::new(harness.registry.clone());
    bridge.mount_pass().await.unwrap();

    let response = bridge.dispatch("shop", request("GET", "/items")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body["slug"], json!("shop"));
    assert_eq!(response.body["path"], json!("/items"));
}

#[tokio::test]
async fn inactive_extension_is_refused_per_request() {
    let root = tempdir().unwrap();
    let harness = make_registry(ExtensionKind::Plugin, root.path());
    write_descriptor(root.path(), "toggle", ExtensionKind::Plugin, &routed_manifest("toggle"));
    harness
        .loader
        .put("toggle", Arc::new(TestModule::new(routed_manifest("toggle"))));

    harness
        .registry
        .register_from_dir(&root.path().join("toggle"), true)
        .await
        .unwrap();
    let bridge = RouteBridge::new(harness.registry.clone());
    bridge.mount_pass().await.unwrap();

    bridge.dispatch("toggle", request("GET", "/items")).await.unwrap();

    // Deactivation takes effect immediately; routes stay mounted.
    harness.registry.deactivate("toggle").await.unwrap();
    let err = bridge
        .dispatch("toggle", request("GET", "/items"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtensionSystemError::Inactive { .. }));
    assert!(bridge.mounted_slugs().await.contains(&"toggle".to_string()));

    // And reactivation brings it back without another mount pass.
    harness.registry.activate("toggle").await.unwrap();
    bridge.dispatch("toggle", request("GET", "/items")).await.unwrap();
}

#[tokio::test]
async fn mount_pass_is_idempotent_and_additive() {
    let root = tempdir().unwrap();
    let harness = make_registry(ExtensionKind::Plugin, root.path());
    write_descriptor(root.path(), "first", ExtensionKind::Plugin, &routed_manifest("first"));
    harness
        .loader
        .put("first", Arc::new(TestModule::new(routed_manifest("first"))));
    harness
        .registry
        .register_from_dir(&root.path().join("first"), true)
        .await
        .unwrap();

    let bridge = RouteBridge::new(harness.registry.clone());
    bridge.mount_pass().await.unwrap();
    bridge.mount_pass().await.unwrap();
    assert_eq!(bridge.mounted_slugs().await.len(), 1);

    // Install another extension and re-run the pass.
    write_descriptor(root.path(), "second", ExtensionKind::Plugin, &routed_manifest("second"));
    harness
        .loader
        .put("second", Arc::new(TestModule::new(routed_manifest("second"))));
    harness
        .registry
        .register_from_dir(&root.path().join("second"), true)
        .await
        .unwrap();
    bridge.mount_pass().await.unwrap();

    let mut slugs = bridge.mounted_slugs().await;
    slugs.sort();
    assert_eq!(slugs, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn unmatched_routes_are_not_found() {
    let root = tempdir().unwrap();
    let harness = make_registry(ExtensionKind::Plugin, root.path());
    write_descriptor(root.path(), "shop", ExtensionKind::Plugin, &routed_manifest("shop"));
    harness
        .loader
        .put("shop", Arc::new(TestModule::new(routed_manifest("shop"))));
    harness
        .registry
        .register_from_dir(&root.path().join("shop"), true)
        .await
        .unwrap();

    let bridge = RouteBridge::new(harness.registry.clone());
    bridge.mount_pass().await.unwrap();

    // Unknown slug.
    let err = bridge.dispatch("ghost", request("GET", "/items")).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::RouteNotFound { .. }));

    // Known slug, undeclared path.
    let err = bridge.dispatch("shop", request("GET", "/nope")).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::RouteNotFound { .. }));

    // Known path, undeclared method.
    let err = bridge.dispatch("shop", request("DELETE", "/items")).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::RouteNotFound { .. }));
}

#[tokio::test]
async fn method_match_is_case_insensitive() {
    let root = tempdir().unwrap();
    let harness = make_registry(ExtensionKind::Plugin, root.path());
    write_descriptor(root.path(), "shop", ExtensionKind::Plugin, &routed_manifest("shop"));
    harness
        .loader
        .put("shop", Arc::new(TestModule::new(routed_manifest("shop"))));
    harness
        .registry
        .register_from_dir(&root.path().join("shop"), true)
        .await
        .unwrap();

    let bridge = RouteBridge::new(harness.registry.clone());
    bridge.mount_pass().await.unwrap();

    bridge.dispatch("shop", request("get", "/items")).await.unwrap();
    bridge.dispatch("shop", request("Post", "/items")).await.unwrap();
}
