use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A product as fetched from a platform, fully hydrated: the adapter has
/// already drained variant and inventory pagination before handing it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProductData {
    pub platform_product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub is_archived: bool,
    pub variants: Vec<PlatformVariantData>,
    /// The platform's own variant count, when reported. Used to verify
    /// pagination drained every page.
    pub variants_count: Option<u64>,
}

/// A variant as fetched from a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformVariantData {
    pub platform_variant_id: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub options: HashMap<String, String>,
    pub is_taxable: bool,
    pub tax_code: Option<String>,
    pub requires_shipping: bool,
    pub image_url: Option<String>,
    pub inventory: Vec<PlatformInventoryData>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One inventory quantity at one platform location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInventoryData {
    /// `None` means the platform's implicit default location.
    pub platform_location_id: Option<String>,
    pub quantity: i64,
}

/// A stock location on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformLocationData {
    pub platform_location_id: String,
    pub name: String,
    pub is_default: bool,
}

/// The slice of a platform variant the suggester matches on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformVariantSummary {
    pub platform_variant_id: String,
    pub platform_product_id: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
}

impl PlatformVariantData {
    /// Reduce to the fields the suggester needs.
    pub fn to_summary(&self, platform_product_id: Option<String>) -> PlatformVariantSummary {
        PlatformVariantSummary {
            platform_variant_id: self.platform_variant_id.clone(),
            platform_product_id,
            sku: self.sku.clone(),
            barcode: self.barcode.clone(),
            title: self.title.clone(),
            price: Some(self.price),
            image_url: self.image_url.clone(),
        }
    }
}
