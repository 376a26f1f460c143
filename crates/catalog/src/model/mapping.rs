use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Push outcome recorded on a mapping row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mapping_sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
    Pending,
}

/// Link between one canonical variant and one platform variant on one
/// connection.
///
/// At most one row per `(platform_connection_id, product_variant_id)` and
/// per `(platform_connection_id, platform_variant_id)`. Deleting either
/// side invalidates the row; the push-deletion path cleans orphans.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformProductMapping {
    pub id: Uuid,
    pub platform_connection_id: Uuid,
    pub product_variant_id: Uuid,
    pub platform_product_id: String,
    pub platform_variant_id: Option<String>,
    pub platform_sku: Option<String>,
    pub is_enabled: bool,
    pub sync_status: SyncStatus,
    pub sync_error_message: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformProductMapping {
    pub fn new(
        platform_connection_id: Uuid,
        product_variant_id: Uuid,
        platform_product_id: impl Into<String>,
        platform_variant_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            platform_connection_id,
            product_variant_id,
            platform_product_id: platform_product_id.into(),
            platform_variant_id,
            platform_sku: None,
            is_enabled: true,
            sync_status: SyncStatus::Pending,
            sync_error_message: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_platform_sku(mut self, sku: Option<String>) -> Self {
        self.platform_sku = sku;
        self
    }

    pub fn mark_synced(&mut self) {
        self.sync_status = SyncStatus::Success;
        self.sync_error_message = None;
        self.last_synced_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.sync_status = SyncStatus::Error;
        self.sync_error_message = Some(message.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_round_trips() {
        let mut mapping = PlatformProductMapping::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "prod-1",
            Some("var-1".into()),
        );
        assert_eq!(mapping.sync_status, SyncStatus::Pending);

        mapping.mark_failed("platform rejected SKU");
        assert_eq!(mapping.sync_status, SyncStatus::Error);
        assert!(mapping.sync_error_message.is_some());

        mapping.mark_synced();
        assert_eq!(mapping.sync_status, SyncStatus::Success);
        assert!(mapping.sync_error_message.is_none());
        assert!(mapping.last_synced_at.is_some());
    }
}
