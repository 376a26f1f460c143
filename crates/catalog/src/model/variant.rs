use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical product variant.
///
/// Belongs to exactly one product. The SKU is nullable but unique per
/// `(user_id, sku)` when present — that pair is the upsert conflict key for
/// scan persistence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    /// Option-name to option-value mapping; order irrelevant.
    pub options: Json<HashMap<String, String>>,
    pub is_taxable: bool,
    pub tax_code: Option<String>,
    pub requires_shipping: bool,
    /// Weak reference into the owning product's image sequence.
    pub image_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    pub fn new(product_id: Uuid, user_id: Uuid, title: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            user_id,
            sku: None,
            barcode: None,
            title: title.into(),
            description: None,
            price,
            compare_at_price: None,
            cost: None,
            weight: None,
            weight_unit: None,
            options: Json(HashMap::new()),
            is_taxable: true,
            tax_code: None,
            requires_shipping: true,
            image_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options = Json(options);
        self
    }

    /// A SKU that is present and non-blank after trimming.
    pub fn effective_sku(&self) -> Option<&str> {
        self.sku
            .as_deref()
            .map(str::trim)
            .filter(|sku| !sku.is_empty())
    }
}
