//! # Health Check Endpoints
//!
//! - **Liveness** (`/health`): the process is up; always 200.
//! - **Readiness** (`/ready`): database and queue backing answer; 200 when
//!   both do, 503 otherwise. Used by load balancers and orchestration
//!   probes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use channelsync_core::jobs::JobQueue;
use serde_json::json;
use tracing::error;

use crate::state::AppState;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "channelsync-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: checks the database and the queue backing.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 503, description = "A dependency is unavailable")
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = match state.db.health_check().await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "database readiness check failed");
            false
        }
    };

    let queue_ok = match state.queue.health_check().await {
        Ok(healthy) => healthy,
        Err(err) => {
            error!(error = %err, "queue readiness check failed");
            false
        }
    };

    let status = if database_ok && queue_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ready" } else { "degraded" },
            "checks": {
                "database": database_ok,
                "queue": queue_ok,
            }
        })),
    )
}
