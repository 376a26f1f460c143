use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Canonical product.
///
/// Owned by its `user_id`; created during a scan or manually, destroyed only
/// by an explicit delete that cascades to variants, inventory levels and
/// images.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub is_archived: bool,
    pub title: String,
    pub description: Option<String>,
    /// Ordered image URLs; variants reference positions in this sequence.
    pub image_urls: Vec<String>,
    /// Scan provenance key, `<connection_id>:<platform_product_id>`, unique
    /// when present. The upsert conflict key that makes re-running a scan
    /// converge instead of duplicating products. Manually created products
    /// have none.
    pub origin_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            is_archived: false,
            title: title.into(),
            description: None,
            image_urls: Vec::new(),
            origin_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key a scan uses to make product persistence idempotent.
    pub fn scan_origin_key(connection_id: Uuid, platform_product_id: &str) -> String {
        format!("{}:{}", connection_id, platform_product_id)
    }

    pub fn with_origin_key(mut self, origin_key: impl Into<String>) -> Self {
        self.origin_key = Some(origin_key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_urls(mut self, image_urls: Vec<String>) -> Self {
        self.image_urls = image_urls;
        self
    }
}

/// One image row for a variant, written best-effort after a scan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VariantImage {
    pub product_variant_id: Uuid,
    pub image_url: String,
    pub position: i32,
}
