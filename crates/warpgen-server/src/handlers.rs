//! HTTP Handlers
//!
//! `GET /api/warp` (and the `/warp` alias) provisions a fresh identity and
//! returns the config base64-encoded inside a JSON envelope.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use warpgen_registration::{ProvisionError, Provisioner};

/// Application state shared across handlers
pub struct AppState {
    pub provisioner: Provisioner,
}

/// Response envelope
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn content(content: String) -> Self {
        Self { success: true, content: Some(content), message: None }
    }

    pub fn failure(message: String) -> Self {
        Self { success: false, content: None, message: Some(message) }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Provisioning failure as an HTTP response
struct ApiFailure(ProvisionError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ProvisionError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(Envelope::failure(self.0.to_string()))).into_response()
    }
}

/// GET /api/warp, GET /warp
///
/// Any other verb is refused before anything is generated or sent.
pub async fn warp_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
) -> Response {
    if method != Method::GET {
        tracing::debug!("Refusing {} on provisioning route", method);
        return ApiFailure(ProvisionError::MethodNotAllowed).into_response();
    }

    match state.provisioner.provision().await {
        Ok(config) => Json(Envelope::content(config.to_base64())).into_response(),
        Err(e) => ApiFailure(e).into_response(),
    }
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Routes without the outer layers
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/warp", any(warp_handler))
        .route("/warp", any(warp_handler))
        .with_state(state)
}

/// Routes with request tracing, as served
///
/// No CORS layer: the page calling the API is served from the same
/// origin, and preflight `OPTIONS` must reach `warp_handler` like any
/// other non-GET verb.
pub fn app(state: Arc<AppState>) -> Router {
    router(state).layer(TraceLayer::new_for_http())
}
