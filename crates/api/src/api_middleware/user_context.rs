//! User Context Middleware
//!
//! Authentication itself lives in an upstream gateway; by the time a
//! request reaches this service its identity has been verified and is
//! carried as an `X-User-Id` header. This middleware turns that header
//! into a typed extension for the `/sync` surface and rejects requests
//! that lack it. The webhook surface never passes through here — webhooks
//! authenticate by signature, not by user.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the calling user, as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Uuid,
}

pub async fn user_context_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match extract_user_id(&headers) {
        Some(user_id) => {
            request.extensions_mut().insert(UserContext { user_id });
            next.run(request).await
        }
        None => {
            warn!("request without a valid user id header");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing user identity",
                    "message": "This endpoint requires a valid X-User-Id header from the gateway."
                })),
            )
                .into_response()
        }
    }
}

fn extract_user_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}
