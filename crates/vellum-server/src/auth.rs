//! Bearer-token auth for the admin API.
//!
//! When no token is configured the middleware is a no-op, which keeps
//! local development friction-free. With a token configured, every
//! request through this layer must carry `Authorization: Bearer <token>`.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(ApiError {
            status: axum::http::StatusCode::UNAUTHORIZED,
            message: "unauthorized".to_string(),
        }),
    }
}
