use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use vellum_core::extension_system::module::{ExtensionModule, ModuleLoader};
use vellum_core::extension_system::{ExtResult, ExtensionKind};
use vellum_core::kernel::bootstrap::ApplicationConfig;
use vellum_core::Application;

use crate::config::ServerConfig;
use crate::db::{open_in_memory, SqliteContentRepository, SqliteRegistrationStore};
use crate::routes::build_router;
use crate::state::AppState;

struct NullModuleLoader;

impl ModuleLoader for NullModuleLoader {
    fn load(&self, _dir: &Path) -> ExtResult<Option<Arc<dyn ExtensionModule>>> {
        Ok(None)
    }
}

struct TestServer {
    router: Router,
    _base: TempDir,
}

async fn test_server(api_token: Option<&str>) -> TestServer {
    let base = tempdir().unwrap();
    let config = ServerConfig {
        data_dir: base.path().to_path_buf(),
        api_token: api_token.map(|t| t.to_string()),
        ..ServerConfig::default()
    };

    // Seed one plugin (with declared routes) and one theme.
    let plugin_dir = config.plugins_root().join("gallery");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(
        plugin_dir.join("plugin.json"),
        json!({
            "slug": "gallery",
            "name": "Gallery",
            "defaultSettings": { "columns": 3 },
            "serverRoutes": [ { "method": "GET", "path": "/albums" } ]
        })
        .to_string(),
    )
    .unwrap();
    let theme_dir = config.themes_root().join("mint");
    std::fs::create_dir_all(&theme_dir).unwrap();
    std::fs::write(
        theme_dir.join("theme.json"),
        json!({ "slug": "mint", "settings": { "accent": "#000" } }).to_string(),
    )
    .unwrap();

    let conn = open_in_memory().unwrap();
    let app = Arc::new(
        Application::new(ApplicationConfig {
            plugins_root: config.plugins_root(),
            themes_root: config.themes_root(),
            plugin_store: Arc::new(SqliteRegistrationStore::new(
                conn.clone(),
                ExtensionKind::Plugin,
            )),
            theme_store: Arc::new(SqliteRegistrationStore::new(
                conn.clone(),
                ExtensionKind::Theme,
            )),
            repository: Arc::new(SqliteContentRepository::new(conn)),
            module_loader: Arc::new(NullModuleLoader),
        })
        .unwrap(),
    );
    app.start().await.unwrap();

    let state = AppState {
        app,
        uploads_dir: config.uploads_dir(),
        api_token: config.api_token.clone(),
    };
    TestServer {
        router: build_router(state, &config),
        _base: base,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let server = test_server(None).await;
    let response = server.router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], json!("ok"));
}

#[tokio::test]
async fn lists_bootstrapped_extensions() {
    let server = test_server(None).await;

    let response = server
        .router
        .clone()
        .oneshot(get("/api/plugins"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let plugins = body_json(response).await;
    assert_eq!(plugins[0]["slug"], json!("gallery"));
    assert_eq!(plugins[0]["isActive"], json!(false));
    assert_eq!(plugins[0]["settings"]["columns"], json!(3));

    let response = server.router.oneshot(get("/api/themes/active")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let theme = body_json(response).await;
    assert_eq!(theme["slug"], json!("mint"));
    assert_eq!(theme["styleUrl"], json!("/themes/mint/style.css"));
}

#[tokio::test]
async fn activation_round_trip() {
    let server = test_server(None).await;

    let response = server
        .router
        .clone()
        .oneshot(post("/api/plugins/gallery/activate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["isActive"], json!(true));

    let response = server
        .router
        .oneshot(post("/api/plugins/gallery/deactivate"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["isActive"], json!(false));
}

#[tokio::test]
async fn dispatch_refuses_inactive_plugins() {
    let server = test_server(None).await;

    // Routes were mounted at startup but the plugin is inactive.
    let response = server
        .router
        .oneshot(get("/api/plugins/gallery/albums"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], json!("Plugin inactive"));
}

#[tokio::test]
async fn dispatch_unknown_slug_is_404() {
    let server = test_server(None).await;
    let response = server
        .router
        .oneshot(get("/api/plugins/ghost/anything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_must_be_an_object() {
    let server = test_server(None).await;
    let request = Request::builder()
        .method("PUT")
        .uri("/api/plugins/gallery/settings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2, 3]"))
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_round_trip() {
    let server = test_server(None).await;
    let request = Request::builder()
        .method("PUT")
        .uri("/api/plugins/gallery/settings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "columns": 5 }).to_string()))
        .unwrap();
    let response = server.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let plugin = body_json(response).await;
    assert_eq!(plugin["settings"]["columns"], json!(5));
}

#[tokio::test]
async fn unknown_extension_is_404() {
    let server = test_server(None).await;
    let response = server
        .router
        .clone()
        .oneshot(post("/api/plugins/missing/activate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .router
        .oneshot(get("/api/themes/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn theme_activation_is_exclusive_over_http() {
    let server = test_server(None).await;

    // Install a second theme directly on disk and re-activate via API.
    // (Bootstrap already activated "mint".)
    let response = server
        .router
        .clone()
        .oneshot(get("/api/themes/active"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["slug"], json!("mint"));
}

#[tokio::test]
async fn admin_api_requires_token_when_configured() {
    let server = test_server(Some("sekrit")).await;

    let response = server
        .router
        .clone()
        .oneshot(get("/api/plugins"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/plugins")
        .header(header::AUTHORIZATION, "Bearer sekrit")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/api/plugins")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The dispatch namespace and health stay open.
    let response = server
        .router
        .clone()
        .oneshot(get("/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = server
        .router
        .oneshot(get("/api/plugins/gallery/albums"))
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bootstrap_registers_packages_dropped_on_disk() {
    let server = test_server(None).await;

    // Drop a new plugin directory in place after startup.
    let plugin_dir = server._base.path().join("plugins/late");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(
        plugin_dir.join("plugin.json"),
        json!({ "slug": "late", "name": "Latecomer" }).to_string(),
    )
    .unwrap();

    let response = server
        .router
        .clone()
        .oneshot(post("/api/plugins/bootstrap"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let plugins = body_json(response).await;
    let slugs: Vec<_> = plugins
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap().to_string())
        .collect();
    assert!(slugs.contains(&"gallery".to_string()));
    assert!(slugs.contains(&"late".to_string()));

    // Re-running is idempotent.
    let response = server
        .router
        .oneshot(post("/api/plugins/bootstrap"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn delete_removes_registration() {
    let server = test_server(None).await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/plugins/gallery?data=true")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.router.oneshot(get("/api/plugins")).await.unwrap();
    let plugins = body_json(response).await;
    assert_eq!(plugins.as_array().unwrap().len(), 0);
}
