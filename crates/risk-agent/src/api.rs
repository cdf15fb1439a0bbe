//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use risk_lib::{
    artifact::ArtifactMetadata,
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    models::{ObjectParams, PredictionResult},
    predictor::{Capabilities, PredictorRuntime, RuntimeState},
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub runtime: PredictorRuntime,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(runtime: PredictorRuntime, health_registry: HealthRegistry) -> Self {
        Self {
            runtime,
            health_registry,
        }
    }

    /// Mirror the runtime state into the health registry
    pub async fn refresh_runtime_health(&self) {
        let state = self.runtime.state().await;
        let last_error = self.runtime.last_error().await;
        self.health_registry
            .update(
                components::RUNTIME,
                ComponentHealth::for_runtime(state, last_error.as_deref()),
            )
            .await;
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Current model and lifecycle state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub state: RuntimeState,
    pub version: Option<String>,
    pub metadata: Option<ArtifactMetadata>,
    pub last_error: Option<String>,
    pub capabilities: Capabilities,
}

/// Health check response - 200 while operational, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_runtime_health().await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        // Fallback predictions still work
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn predict(State(state): State<Arc<AppState>>, Json(params): Json<ObjectParams>) -> Response {
    match state.runtime.predict(&params).await {
        Ok(result) => Json(result).into_response(),
        Err(e) if e.is_invalid_input() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Items that do not parse as objects are scored like invalid ones
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(items): Json<Vec<serde_json::Value>>,
) -> Json<Vec<PredictionResult>> {
    let parsed: Vec<Option<ObjectParams>> = items
        .into_iter()
        .map(|item| serde_json::from_value(item).ok())
        .collect();
    let params: Vec<ObjectParams> = parsed.iter().flatten().copied().collect();

    let mut scored = state.runtime.predict_batch(&params).await.into_iter();
    let results = parsed
        .iter()
        .map(|item| match item {
            Some(_) => scored
                .next()
                .unwrap_or_else(PredictionResult::conservative_default),
            None => PredictionResult::conservative_default(),
        })
        .collect();

    Json(results)
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime.stats())
}

async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    let runtime = &state.runtime;
    Json(ModelInfo {
        state: runtime.state().await,
        version: runtime.model_version().await,
        metadata: runtime.model_metadata().await,
        last_error: runtime.last_error().await,
        capabilities: runtime.capabilities(),
    })
}

async fn invalidate_model(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    state.runtime.invalidate().await;
    state.refresh_runtime_health().await;
    model_info(State(state)).await
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/predict", post(predict))
        .route("/v1/predict/batch", post(predict_batch))
        .route("/v1/stats", get(stats))
        .route("/v1/model", get(model_info))
        .route("/v1/model/invalidate", post(invalidate_model))
        .with_state(state)
}

/// Start the API server; returns once `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
