//! Health check endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

/// Liveness: the process is up. Does not touch the store.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: the store answers a trivial read.
///
/// ```text
/// GET /ready   200 {"status":"ready"} | 503
/// ```
///
/// # Errors
///
/// Returns 503 when the store cannot be reached.
pub async fn readiness(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    match state.engine.store().ping().await {
        Ok(()) => Ok(Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err(AppError::unavailable("Store unavailable"))
        }
    }
}
