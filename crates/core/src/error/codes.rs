use serde::{Deserialize, Serialize};
use std::fmt;

/// Standardized error codes for the sync engine.
///
/// Sync-domain codes come first; the remainder are technical categories the
/// infrastructure layers raise. Codes, not messages, drive retry decisions
/// and HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Sync Domain Errors (1000-1999)
    /// Entity ownership does not match the calling user. Never retried.
    AuthorizationFailed = 1000,
    /// Canonical entity or mapping absent. Not retried for the current job.
    ResourceNotFound = 1001,
    /// Webhook MAC verification failed. Responds 401, dropped.
    WebhookSignatureInvalid = 1002,
    /// Platform rejected our credentials (401/403). Connection flips to
    /// `error`; user action required; never retried.
    PlatformAuthRejected = 1003,
    /// Network timeout, 5xx or 429 from a platform. Retried with backoff.
    PlatformTransient = 1004,
    /// Platform rejected the input (e.g. missing SKU). Recorded on the
    /// mapping row; not retried.
    PlatformRejectedInput = 1005,
    /// No mapping row for the connection. Warning only; the job skips the
    /// affected connection.
    MappingMissing = 1006,
    /// Connection is mid-scan/reconcile; pushes are refused at enqueue.
    ConnectionBusy = 1007,

    // General System Errors (2000-2999)
    InternalServerError = 2000,
    ConfigurationError = 2001,
    Timeout = 2002,

    // Database Errors (3000-3999)
    DatabaseConnectionError = 3000,
    DatabaseConstraintViolation = 3001,
    DatabaseQueryError = 3002,

    // Network & Communication Errors (4000-4999)
    NetworkError = 4000,
    SerializationError = 4001,

    // Input Validation Errors (5000-5999)
    ValidationFailed = 5000,
    InvalidInput = 5001,

    // Cache & Storage Errors (6000-6999)
    EncryptionError = 6000,
    DecryptionError = 6001,

    // Job & Queue Errors (7000-7999)
    JobQueueError = 7000,
    JobExecutionFailed = 7001,
    JobTimeout = 7002,
}

impl ErrorCode {
    /// HTTP status for this error on the API surface.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::AuthorizationFailed => 403,
            ErrorCode::ResourceNotFound => 404,
            ErrorCode::WebhookSignatureInvalid => 401,
            ErrorCode::PlatformAuthRejected => 502,
            ErrorCode::PlatformTransient => 502,
            ErrorCode::PlatformRejectedInput => 422,
            ErrorCode::MappingMissing => 404,
            ErrorCode::ConnectionBusy => 409,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => 400,

            ErrorCode::Timeout | ErrorCode::JobTimeout => 408,

            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseQueryError
            | ErrorCode::NetworkError
            | ErrorCode::SerializationError
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError
            | ErrorCode::JobQueueError
            | ErrorCode::JobExecutionFailed => 500,
        }
    }

    /// Whether the queue runtime should retry a job that failed with this
    /// code. The propagation policy in the workers consults this before
    /// re-throwing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::PlatformTransient
                | ErrorCode::Timeout
                | ErrorCode::NetworkError
                | ErrorCode::DatabaseConnectionError
                | ErrorCode::JobQueueError
                | ErrorCode::JobTimeout
        )
    }

    /// Category label for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::AuthorizationFailed
            | ErrorCode::ResourceNotFound
            | ErrorCode::WebhookSignatureInvalid
            | ErrorCode::PlatformAuthRejected
            | ErrorCode::PlatformTransient
            | ErrorCode::PlatformRejectedInput
            | ErrorCode::MappingMissing
            | ErrorCode::ConnectionBusy => "sync",
            ErrorCode::InternalServerError | ErrorCode::ConfigurationError | ErrorCode::Timeout => {
                "system"
            }
            ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseQueryError => "database",
            ErrorCode::NetworkError | ErrorCode::SerializationError => "network",
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => "validation",
            ErrorCode::EncryptionError | ErrorCode::DecryptionError => "storage",
            ErrorCode::JobQueueError | ErrorCode::JobExecutionFailed | ErrorCode::JobTimeout => {
                "jobs"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_are_retryable() {
        assert!(ErrorCode::PlatformTransient.is_retryable());
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(ErrorCode::JobTimeout.is_retryable());
    }

    #[test]
    fn terminal_codes_are_not_retryable() {
        assert!(!ErrorCode::AuthorizationFailed.is_retryable());
        assert!(!ErrorCode::PlatformAuthRejected.is_retryable());
        assert!(!ErrorCode::PlatformRejectedInput.is_retryable());
        assert!(!ErrorCode::MappingMissing.is_retryable());
    }

    #[test]
    fn http_statuses_match_the_webhook_contract() {
        assert_eq!(ErrorCode::WebhookSignatureInvalid.http_status(), 401);
        assert_eq!(ErrorCode::ValidationFailed.http_status(), 400);
        assert_eq!(ErrorCode::AuthorizationFailed.http_status(), 403);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
    }
}
