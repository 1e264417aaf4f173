//! HTTP surface.
//!
//! Three route groups: the admin API (token-guarded when a token is
//! configured), the public extension dispatch wildcard, and static
//! theme assets. Admin routes for plugins and themes mirror each other;
//! the theme group adds `/active` and drops `/deactivate` since themes
//! switch by activating another one.

pub mod common;
pub mod plugins;
pub mod themes;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::ServerConfig;
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let admin = Router::new()
        .route("/api/plugins", get(plugins::list).post(plugins::install))
        .route("/api/plugins/bootstrap", post(plugins::bootstrap))
        .route(
            "/api/plugins/{slug}",
            get(plugins::get).delete(plugins::delete),
        )
        .route("/api/plugins/{slug}/activate", post(plugins::activate))
        .route("/api/plugins/{slug}/deactivate", post(plugins::deactivate))
        .route("/api/plugins/{slug}/settings", put(plugins::save_settings))
        .route("/api/themes", get(themes::list).post(themes::install))
        .route("/api/themes/bootstrap", post(themes::bootstrap))
        .route("/api/themes/active", get(themes::get_active))
        .route("/api/themes/{slug}", get(themes::get).delete(themes::delete))
        .route("/api/themes/{slug}/activate", post(themes::activate))
        .route("/api/themes/{slug}/settings", put(themes::save_settings))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    // Extension routes stay public; per-request activation checks happen
    // in the bridge.
    let dispatch = Router::new().route("/api/plugins/{slug}/{*rest}", any(plugins::dispatch));

    Router::new()
        .route("/api/health", get(health))
        .merge(admin)
        .merge(dispatch)
        .nest_service("/themes", ServeDir::new(config.themes_root()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests;
