//! HTTP API of the relay.
//!
//! - GET /
//! - GET /health
//! - POST /generate?model=<id>&stream=<bool>  body `{"prompt": "..."}`

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::server::aggregate::aggregate;
use crate::server::streaming::chunks_to_sse_stream;
use crate::upstream::{GenerationRequest, UpstreamClient, UpstreamError, ValidationError};

/// Application state shared across handlers.
pub struct AppState {
    pub upstream: UpstreamClient,
    pub config: Arc<Config>,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate", post(generate))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

/// Query parameters of `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub stream: bool,
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(de::Error::invalid_value(
            de::Unexpected::Str(&raw),
            &"a boolean (true/false, 1/0, yes/no, on/off)",
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of every failed response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected(status, _) => *status,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello World from FastAPI".to_string(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

async fn generate(
    State(state): State<Arc<AppState>>,
    params: Result<Query<GenerateParams>, QueryRejection>,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let Json(body) = body?;

    let request = GenerationRequest::new(
        body.prompt,
        params.model,
        state.upstream.default_model(),
        params.stream,
    )?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = request_id,
        prompt = request.prompt(),
        model = request.model(),
        stream = request.stream(),
        "Received generate request"
    );

    let chunks = state.upstream.fetch(&request);

    if request.stream() {
        let stream = chunks_to_sse_stream(chunks, request_id);
        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        match aggregate(chunks).await {
            Ok(merged) => Ok(Json(merged).into_response()),
            Err(e) => {
                warn!(request_id = request_id, error = %e, "Generation failed");
                Err(e.into())
            }
        }
    }
}
