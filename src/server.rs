//! HTTP surface over [`SeriesResolver`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/resolve` | Resolve `{ "query": "..." }` to metadata and a series selection |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! A request that reaches the resolver always answers `200`: "no match" is a
//! selection with a null `series_id`, not an HTTP error. Only malformed
//! requests are rejected, always with a JSON body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! A body that is not JSON, or lacks a string `query`, keeps the status axum
//! assigns (`400`, `415` or `422`) with code `invalid_body`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{QueryMetadata, SeriesSelection};
use crate::pipeline::SeriesResolver;

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, resolver: Arc<SeriesResolver>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(resolver);

    info!(bind = %bind_addr, "series resolver listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes with CORS applied.
pub fn router(resolver: Arc<SeriesResolver>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/resolve", post(handle_resolve))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(resolver)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: rejection.status(),
            code: "invalid_body".to_string(),
            message: rejection.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/resolve ============

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    query: String,
}

#[derive(Serialize)]
struct ResolveResponse {
    request_id: String,
    metadata: QueryMetadata,
    selection: SeriesSelection,
}

fn validated_query(request: &ResolveRequest) -> Result<&str, AppError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(query)
}

/// Handler for `POST /api/resolve`.
///
/// Each request runs inside a span carrying a fresh request id, which is
/// echoed in the response.
async fn handle_resolve(
    State(resolver): State<Arc<SeriesResolver>>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, AppError> {
    let Json(request) = payload?;
    let query = validated_query(&request)?;
    let request_id = Uuid::new_v4().to_string();

    let span = info_span!("resolve_request", request_id = %request_id);
    let resolution = resolver.resolve_query(query).instrument(span).await;

    Ok(Json(ResolveResponse {
        request_id,
        metadata: resolution.metadata,
        selection: resolution.selection,
    }))
}
