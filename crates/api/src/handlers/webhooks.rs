//! Webhook ingestion surface.
//!
//! `POST /webhook/{platform}`: raw bytes in, status out. The response is
//! decided synchronously (signature, routing, enabled check); processing
//! is asynchronous and never reflected in the response. Platforms retry
//! aggressively on slow responses, so nothing here waits on the queue.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use channelsync_catalog::model::PlatformType;
use channelsync_platforms::types::WebhookHeaders;
use channelsync_sync::ingest::IngestOutcome;
use serde_json::json;
use tracing::debug;

use crate::state::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/:platform", post(receive_webhook))
}

/// Receive a platform webhook.
#[utoipa::path(
    post,
    path = "/webhook/{platform}",
    tag = "webhooks",
    params(("platform" = String, Path, description = "Platform tag: shopify, square or clover")),
    request_body(content = String, description = "Raw webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Accepted"),
        (status = 400, description = "Malformed payload or unknown platform/connection"),
        (status = 401, description = "Signature rejected")
    )
)]
async fn receive_webhook(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(platform_type) = PlatformType::parse(&platform) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unknown platform" })),
        );
    };

    let normalized_headers: WebhookHeaders = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let outcome = state
        .ingestor
        .ingest(platform_type, &body, &normalized_headers)
        .await;
    debug!(platform = %platform_type, ?outcome, "webhook ingested");

    match outcome {
        IngestOutcome::Accepted | IngestOutcome::Disabled => {
            (StatusCode::OK, Json(json!({ "received": true })))
        }
        IngestOutcome::SignatureRejected => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "signature verification failed" })),
        ),
        IngestOutcome::Rejected => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "webhook rejected" })),
        ),
    }
}
