//! Shared HTTP plumbing for platform adapters: one client builder and a
//! single place where HTTP status codes become the sync error taxonomy.

use channelsync_core::{Error, ErrorCode, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// Build the reqwest client an adapter uses for all calls.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("channelsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::new(ErrorCode::ConfigurationError, e.to_string()))
}

/// Classify a non-success platform response.
///
/// - 401/403: credentials rejected; the connection flips to `error` and the
///   job must not retry.
/// - 429 and 5xx: transient; retried with backoff.
/// - Other 4xx: the platform rejected our input; recorded on the mapping
///   row and not retried.
pub fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = if body.len() > 512 { &body[..512] } else { body };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::new(
            ErrorCode::PlatformAuthRejected,
            format!("platform rejected credentials (HTTP {})", status.as_u16()),
        )
        .with_details(detail.to_string())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::new(
            ErrorCode::PlatformTransient,
            format!("platform returned HTTP {}", status.as_u16()),
        )
        .with_details(detail.to_string())
    } else {
        Error::new(
            ErrorCode::PlatformRejectedInput,
            format!("platform rejected the request (HTTP {})", status.as_u16()),
        )
        .with_details(detail.to_string())
    }
}

/// Classify a reqwest transport error (timeouts, DNS, connection resets).
pub fn transport_error(err: reqwest::Error) -> Error {
    Error::new(ErrorCode::PlatformTransient, err.to_string())
}

/// Check a response, mapping non-2xx statuses into the taxonomy.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}
