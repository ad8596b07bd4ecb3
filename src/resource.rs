//! Resource API service — bearer-token-guarded, claims-derived JSON
//!
//! Independent of the portal's session store: every protected request
//! re-verifies the presented bearer token against the provider's published
//! keys. Any [`AuthError`] maps to 401 with a stable reason code; a key
//! endpoint failure maps to 502.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::verify::{Claims, TokenVerifier};
use crate::{Error, Result};

/// Shared state for the resource service
pub struct ResourceState {
    /// Bearer token verifier
    pub verifier: TokenVerifier,
}

/// Build the resource router. `/api/*` routes are guarded; `/` is public.
pub fn resource_router(state: Arc<ResourceState>) -> Router {
    Router::new()
        .route("/api/me", get(me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            verify_middleware,
        ))
        .route("/", get(index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the resource API
pub async fn serve(state: Arc<ResourceState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "resource API listening");
    axum::serve(listener, resource_router(state)).await?;
    Ok(())
}

/// Verification middleware — rejects before the handler runs
async fn verify_middleware(
    State(state): State<Arc<ResourceState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match state.verifier.verify(authorization.as_deref()).await {
        Ok(claims) => {
            debug!(name = claims.name.as_deref().unwrap_or(""), "bearer token verified");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(Error::Auth(reason)) => {
            warn!(reason = reason.reason(), "rejected bearer token");
            unauthorized_response(&reason)
        }
        Err(e) => {
            warn!(error = %e, "token verification unavailable");
            bad_gateway_response()
        }
    }
}

async fn index() -> &'static str {
    "Hello from the resource API!"
}

/// `GET /api/me` — claims-derived identity of the caller
async fn me(axum::Extension(claims): axum::Extension<Claims>) -> Json<serde_json::Value> {
    Json(json!({
        "name": claims.name,
        "subject": claims.sub,
        "preferred_username": claims.preferred_username,
    }))
}

/// 401 with a stable machine-readable reason
fn unauthorized_response(reason: &AuthError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({
            "error": reason.reason(),
            "message": reason.to_string(),
        })),
    )
        .into_response()
}

/// 502 for key-endpoint failures — the caller's token was never judged
fn bad_gateway_response() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": "Upstream",
            "message": "token verification unavailable",
        })),
    )
        .into_response()
}
