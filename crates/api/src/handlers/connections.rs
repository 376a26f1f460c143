//! Connection lifecycle surface.
//!
//! Drives a connection from authorization through scan, review and
//! confirmation into active sync. Identity arrives as a `UserContext`
//! extension from the gateway middleware.

use axum::{
    extract::{Extension, Path, State},
    routing::{get, post},
    Json, Router,
};
use channelsync_catalog::model::{ConnectionStatus, PlatformProductMapping};
use channelsync_core::jobs::{JobQueue, QueuedJob};
use channelsync_core::{Error, ErrorCode};
use channelsync_sync::jobs::ScanJobData;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api_middleware::user_context::UserContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn connection_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/start-scan", post(start_scan))
        .route("/:id/scan-summary", get(scan_summary))
        .route("/:id/mapping-suggestions", get(mapping_suggestions))
        .route("/:id/confirm-mappings", post(confirm_mappings))
        .route("/:id/activate-sync", post(activate_sync))
}

/// One reviewed suggestion, as submitted by the user.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedMapping {
    pub platform_variant_id: String,
    pub platform_product_id: Option<String>,
    /// Present when the user accepted a link to an existing canonical
    /// variant; absent for "create new" and "skip" choices.
    pub product_variant_id: Option<Uuid>,
    #[serde(default)]
    pub action: MappingAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MappingAction {
    #[default]
    Link,
    CreateNew,
    Skip,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmMappingsRequest {
    pub mappings: Vec<ConfirmedMapping>,
}

/// Kick off the initial scan for a connection.
#[utoipa::path(
    post,
    path = "/sync/connections/{id}/start-scan",
    tag = "connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Scan enqueued"),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Connection is busy")
    )
)]
async fn start_scan(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let connection = state
        .sync
        .store
        .get_connection(user.user_id, connection_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "connection not found"))?;

    if connection.status.is_busy() {
        return Err(ApiError(Error::new(
            ErrorCode::ConnectionBusy,
            format!("connection is {}; scan already in flight", connection.status),
        )));
    }

    // User action: an authorized connection leaves `disconnected` here.
    if connection.status == ConnectionStatus::Disconnected {
        state
            .sync
            .store
            .update_connection_status(connection_id, ConnectionStatus::Connecting)
            .await?;
    }

    let data = serde_json::to_value(ScanJobData {
        connection_id,
        user_id: user.user_id,
    })
    .map_err(Error::from)?;
    let job = QueuedJob::new("initial-scan", data, state.scan_spec.max_attempts);
    let job_id = state.queue.enqueue(&state.scan_spec, job).await?;

    info!(%connection_id, %job_id, "initial scan enqueued");
    Ok(Json(json!({ "jobId": job_id })))
}

/// Counts from the most recent scan.
#[utoipa::path(
    get,
    path = "/sync/connections/{id}/scan-summary",
    tag = "connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Scan summary"),
        (status = 404, description = "Connection or summary not found")
    )
)]
async fn scan_summary(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let connection = state
        .sync
        .store
        .get_connection(user.user_id, connection_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "connection not found"))?;

    let summary = connection.scan_summary().ok_or_else(|| {
        Error::new(
            ErrorCode::ResourceNotFound,
            "no scan has completed for this connection",
        )
    })?;

    Ok(Json(json!({
        "countProducts": summary.count_products,
        "countVariants": summary.count_variants,
        "countLocations": summary.count_locations,
    })))
}

/// Suggestions produced by the latest scan or reconciliation.
#[utoipa::path(
    get,
    path = "/sync/connections/{id}/mapping-suggestions",
    tag = "connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Suggestion list"),
        (status = 404, description = "Connection not found")
    )
)]
async fn mapping_suggestions(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let connection = state
        .sync
        .store
        .get_connection(user.user_id, connection_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "connection not found"))?;

    let suggestions = connection
        .platform_specific_data
        .get("mappingSuggestions")
        .cloned()
        .unwrap_or_else(|| json!([]));

    Ok(Json(json!({ "suggestions": suggestions })))
}

/// Persist the user's mapping choices and activate the connection.
#[utoipa::path(
    post,
    path = "/sync/connections/{id}/confirm-mappings",
    tag = "connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Mappings confirmed; connection syncing"),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Connection is not awaiting review")
    )
)]
async fn confirm_mappings(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<ConfirmMappingsRequest>,
) -> ApiResult<Json<Value>> {
    let connection = state
        .sync
        .store
        .get_connection(user.user_id, connection_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "connection not found"))?;

    if connection.status != ConnectionStatus::NeedsReview {
        return Err(ApiError(Error::new(
            ErrorCode::ConnectionBusy,
            format!(
                "connection is {}; mappings can only be confirmed from needs_review",
                connection.status
            ),
        )));
    }

    let mut linked = 0usize;
    for confirmed in &request.mappings {
        if confirmed.action != MappingAction::Link {
            continue;
        }
        let Some(product_variant_id) = confirmed.product_variant_id else {
            continue;
        };

        // Ownership check through the variant row.
        if state
            .sync
            .store
            .get_variant(user.user_id, product_variant_id)
            .await?
            .is_none()
        {
            return Err(ApiError(Error::new(
                ErrorCode::AuthorizationFailed,
                "confirmed mapping references a variant the calling user does not own",
            )));
        }

        let mapping = PlatformProductMapping::new(
            connection_id,
            product_variant_id,
            confirmed
                .platform_product_id
                .clone()
                .unwrap_or_default(),
            Some(confirmed.platform_variant_id.clone()),
        );
        state.sync.store.upsert_mapping(mapping).await?;
        linked += 1;
    }

    state
        .sync
        .store
        .update_connection_status(connection_id, ConnectionStatus::Syncing)
        .await?;

    info!(%connection_id, linked, "mappings confirmed; connection syncing");
    Ok(Json(json!({ "success": true, "linked": linked })))
}

/// Enqueue a reconciliation pass for an active connection.
#[utoipa::path(
    post,
    path = "/sync/connections/{id}/activate-sync",
    tag = "connections",
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Reconciliation enqueued"),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Connection is not syncing")
    )
)]
async fn activate_sync(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let connection = state
        .sync
        .store
        .get_connection(user.user_id, connection_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, "connection not found"))?;

    if connection.status != ConnectionStatus::Syncing {
        return Err(ApiError(Error::new(
            ErrorCode::ConnectionBusy,
            format!(
                "connection is {}; reconciliation requires an active sync",
                connection.status
            ),
        )));
    }

    let data = serde_json::to_value(ScanJobData {
        connection_id,
        user_id: user.user_id,
    })
    .map_err(Error::from)?;
    let job = QueuedJob::new(
        "reconciliation",
        data,
        state.reconciliation_spec.max_attempts,
    );
    let job_id = state.queue.enqueue(&state.reconciliation_spec, job).await?;

    info!(%connection_id, %job_id, "reconciliation enqueued");
    Ok(Json(json!({ "jobId": job_id })))
}
