use super::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error as ThisError;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Severity levels for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected failures that the flow handles (missing mapping, not found)
    Low,
    /// Degraded behavior worth watching (transient platform failures)
    Medium,
    /// Core functionality affected (auth rejections, data corruption risk)
    High,
    /// Immediate attention required (startup/config failures)
    Critical,
}

/// Main error type for the sync engine.
#[derive(Debug, ThisError, Clone)]
pub struct Error {
    /// Standardized error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional detailed description
    pub details: Option<String>,
    /// Error severity
    pub severity: ErrorSeverity,
    /// Unique id for correlating logs with API responses
    pub error_id: Uuid,
    /// When the error was raised
    pub timestamp: DateTime<Utc>,
    /// Structured metadata (connection id, job id, platform ids)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Error {
    /// Create a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            severity: Self::default_severity_for_code(code),
            error_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create error with details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Set error severity.
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach structured metadata.
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// JSON body for API responses. Messages for 5xx codes are replaced
    /// with a generic line outside development to avoid leaking internals.
    pub fn to_api_response(&self, environment: &str) -> serde_json::Value {
        let message = if environment == "production" && self.http_status() >= 500 {
            "An internal error occurred. Please try again later".to_string()
        } else {
            self.message.clone()
        };

        serde_json::json!({
            "error": {
                "code": self.code,
                "message": message,
                "error_id": self.error_id,
                "timestamp": self.timestamp,
            }
        })
    }

    fn default_severity_for_code(code: ErrorCode) -> ErrorSeverity {
        match code {
            ErrorCode::ResourceNotFound
            | ErrorCode::MappingMissing
            | ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::ConnectionBusy => ErrorSeverity::Low,

            ErrorCode::PlatformTransient
            | ErrorCode::Timeout
            | ErrorCode::NetworkError
            | ErrorCode::JobTimeout
            | ErrorCode::WebhookSignatureInvalid
            | ErrorCode::PlatformRejectedInput => ErrorSeverity::Medium,

            ErrorCode::AuthorizationFailed
            | ErrorCode::PlatformAuthRejected
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseQueryError
            | ErrorCode::SerializationError
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError
            | ErrorCode::JobQueueError
            | ErrorCode::JobExecutionFailed
            | ErrorCode::InternalServerError => ErrorSeverity::High,

            ErrorCode::ConfigurationError => ErrorSeverity::Critical,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "[{}] {}: {}", self.code, self.message, details),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                Error::new(ErrorCode::ResourceNotFound, "row not found")
            }
            sqlx::Error::Database(db) if db.constraint().is_some() => Error::new(
                ErrorCode::DatabaseConstraintViolation,
                format!("constraint violation: {}", db.message()),
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::new(ErrorCode::DatabaseConnectionError, err.to_string())
            }
            _ => Error::new(ErrorCode::DatabaseQueryError, err.to_string()),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::new(ErrorCode::JobQueueError, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::SerializationError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_code_and_metadata() {
        let err = Error::new(ErrorCode::MappingMissing, "no mapping for connection")
            .with_details("variant 7f3a")
            .add_metadata("connection_id", serde_json::json!("c-1"));

        assert_eq!(err.code, ErrorCode::MappingMissing);
        assert_eq!(err.severity, ErrorSeverity::Low);
        assert!(err.to_string().contains("variant 7f3a"));
        assert_eq!(err.metadata["connection_id"], serde_json::json!("c-1"));
    }

    #[test]
    fn production_responses_hide_internal_messages() {
        let err = Error::new(ErrorCode::DatabaseQueryError, "syntax error near SELECT");
        let body = err.to_api_response("production");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.contains("SELECT"));

        let dev_body = err.to_api_response("development");
        assert!(dev_body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("SELECT"));
    }

    #[test]
    fn row_not_found_maps_to_resource_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
    }
}
