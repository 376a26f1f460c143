use channelsync_catalog::mapper::{PlatformLocationData, PlatformProductData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lower-cased header name → value map handed to webhook verification.
///
/// Adapters never see the HTTP framework's header types; the ingest surface
/// normalizes them first.
pub type WebhookHeaders = HashMap<String, String>;

/// Decrypted credentials for one platform connection.
///
/// Decrypted from the connection's vault blob at the top of each job and
/// dropped with the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Per-connection webhook secret, when the platform issues one.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl PlatformCredentials {
    pub fn from_json(raw: &str) -> channelsync_core::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Everything `fetch_all` returns: fully hydrated products plus the
/// platform's stock locations.
#[derive(Debug, Clone)]
pub struct FetchAllResult {
    pub products: Vec<PlatformProductData>,
    pub locations: Vec<PlatformLocationData>,
}

/// Result of a product create on a platform.
#[derive(Debug, Clone)]
pub struct CreateProductResult {
    pub platform_product_id: String,
    /// Canonical variant id → platform variant id, as reported back by the
    /// platform. Missing entries are logged by the caller, never fatal.
    pub variant_ids: HashMap<Uuid, String>,
}

/// One absolute inventory set against a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryUpdate {
    pub platform_product_id: String,
    pub platform_variant_id: String,
    /// `None` targets the platform's default location.
    pub platform_location_id: Option<String>,
    pub quantity: i64,
}

/// Normalized webhook event, ready for the sync processors.
///
/// Serializable because the ingest surface enqueues the normalized event as
/// the webhook job's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    ProductCreated { product: PlatformProductData },
    ProductUpdated { product: PlatformProductData },
    ProductDeleted { platform_product_id: String },
    InventoryChanged {
        platform_variant_id: String,
        platform_location_id: Option<String>,
        quantity: i64,
    },
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::ProductCreated { .. } => "product_created",
            WebhookEvent::ProductUpdated { .. } => "product_updated",
            WebhookEvent::ProductDeleted { .. } => "product_deleted",
            WebhookEvent::InventoryChanged { .. } => "inventory_changed",
        }
    }
}
