use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Canonical inventory level for one variant at one platform location.
///
/// At most one row exists per `(product_variant_id, platform_connection_id,
/// platform_location_id)`; a `None` location means the platform's implicit
/// default location. Quantities are absolute, never deltas.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryLevel {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub platform_connection_id: Uuid,
    pub platform_location_id: Option<String>,
    pub quantity: i64,
    pub last_platform_update_at: Option<DateTime<Utc>>,
}

impl InventoryLevel {
    pub fn new(
        product_variant_id: Uuid,
        platform_connection_id: Uuid,
        platform_location_id: Option<String>,
        quantity: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_variant_id,
            platform_connection_id,
            platform_location_id,
            quantity: quantity.max(0),
            last_platform_update_at: Some(Utc::now()),
        }
    }

    /// Uniqueness key for upserts.
    pub fn conflict_key(&self) -> (Uuid, Uuid, Option<&str>) {
        (
            self.product_variant_id,
            self.platform_connection_id,
            self.platform_location_id.as_deref(),
        )
    }
}
