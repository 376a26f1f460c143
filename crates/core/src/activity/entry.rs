use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome classification for an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Warning,
    Error,
    Info,
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::Success => write!(f, "success"),
            ActivityStatus::Warning => write!(f, "warning"),
            ActivityStatus::Error => write!(f, "error"),
            ActivityStatus::Info => write!(f, "info"),
        }
    }
}

/// One row of the append-only activity log.
///
/// Every push and webhook terminal outcome writes one of these. Entries are
/// never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Kind of entity acted upon, e.g. `Product`, `PlatformConnection`.
    pub entity_type: String,
    /// Id of the entity acted upon.
    pub entity_id: Uuid,
    /// Machine-readable event name, e.g. `PRODUCT_PUSH_CREATED_SUCCESS`.
    pub event_type: String,
    pub status: ActivityStatus,
    /// Human-readable description.
    pub message: String,
    /// Structured details (platform ids, error text, counts).
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        user_id: Uuid,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        event_type: impl Into<String>,
        status: ActivityStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            entity_type: entity_type.into(),
            entity_id,
            event_type: event_type.into(),
            status,
            message: message.into(),
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Event type names written by the sync core.
pub mod events {
    pub const PRODUCT_PUSH_CREATED_SUCCESS: &str = "PRODUCT_PUSH_CREATED_SUCCESS";
    pub const PRODUCT_PUSH_CREATED_FAILED: &str = "PRODUCT_PUSH_CREATED_FAILED";
    pub const PRODUCT_PUSH_CREATED_SKIPPED: &str = "PRODUCT_PUSH_CREATED_SKIPPED";
    pub const PRODUCT_PUSH_UPDATED_SUCCESS: &str = "PRODUCT_PUSH_UPDATED_SUCCESS";
    pub const PRODUCT_PUSH_UPDATED_FAILED: &str = "PRODUCT_PUSH_UPDATED_FAILED";
    pub const PRODUCT_PUSH_UPDATED_SKIPPED: &str = "PRODUCT_PUSH_UPDATED_SKIPPED";
    pub const PRODUCT_PUSH_DELETED_SUCCESS: &str = "PRODUCT_PUSH_DELETED_SUCCESS";
    pub const PRODUCT_PUSH_DELETED_FAILED: &str = "PRODUCT_PUSH_DELETED_FAILED";
    pub const INVENTORY_PUSH_SUCCESS: &str = "INVENTORY_PUSH_SUCCESS";
    pub const INVENTORY_PUSH_FAILED: &str = "INVENTORY_PUSH_FAILED";
    pub const INVENTORY_PUSH_SKIPPED: &str = "INVENTORY_PUSH_SKIPPED";
    pub const WEBHOOK_PRODUCT_CREATED: &str = "WEBHOOK_PRODUCT_CREATED";
    pub const WEBHOOK_PRODUCT_UPDATED: &str = "WEBHOOK_PRODUCT_UPDATED";
    pub const WEBHOOK_PRODUCT_DELETED: &str = "WEBHOOK_PRODUCT_DELETED";
    pub const WEBHOOK_INVENTORY_CHANGED: &str = "WEBHOOK_INVENTORY_CHANGED";
    pub const SCAN_COMPLETED: &str = "SCAN_COMPLETED";
    pub const SCAN_FAILED: &str = "SCAN_FAILED";
    pub const RECONCILIATION_COMPLETED: &str = "RECONCILIATION_COMPLETED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_builder_sets_defaults() {
        let user = Uuid::new_v4();
        let entity = Uuid::new_v4();
        let entry = ActivityEntry::new(
            user,
            "Product",
            entity,
            events::PRODUCT_PUSH_CREATED_SUCCESS,
            ActivityStatus::Success,
            "pushed to shopify",
        )
        .with_details(serde_json::json!({"platform_product_id": "gid://123"}));

        assert_eq!(entry.user_id, user);
        assert_eq!(entry.entity_id, entity);
        assert_eq!(entry.status, ActivityStatus::Success);
        assert_eq!(entry.details["platform_product_id"], "gid://123");
    }
}
