/// Health and metrics endpoints
///
/// - Liveness: the process answers.
/// - Readiness: the storage pool answers a trivial query.

use crate::{context::AppContext, error::MeterResult, metrics};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    /// "ready" or "unavailable"
    pub status: String,
    pub storage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_endpoint))
}

/// Basic liveness check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe - can the service reach storage?
async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> (StatusCode, Json<ReadinessStatus>) {
    let started = Instant::now();

    match ctx.db.test_connection().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessStatus {
                status: "ready".to_string(),
                storage: ctx.db.backend_name().to_string(),
                response_time_ms: Some(started.elapsed().as_millis() as u64),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessStatus {
                    status: "unavailable".to_string(),
                    storage: ctx.db.backend_name().to_string(),
                    response_time_ms: None,
                }),
            )
        }
    }
}

/// Prometheus scrape endpoint
async fn metrics_endpoint() -> MeterResult<String> {
    metrics::render_metrics()
}
