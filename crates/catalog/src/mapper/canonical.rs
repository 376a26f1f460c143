use super::types::PlatformProductData;
use crate::model::EntityRef;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Draft of a canonical product, keyed by a temporary id until persisted.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub temp_id: EntityRef,
    pub platform_product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub is_archived: bool,
}

/// Draft of a canonical variant, cross-linked to its product draft.
#[derive(Debug, Clone)]
pub struct VariantDraft {
    pub temp_id: EntityRef,
    pub product_ref: EntityRef,
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
}

/// Draft of a canonical inventory level, cross-linked to its variant draft.
#[derive(Debug, Clone)]
pub struct LevelDraft {
    pub variant_ref: EntityRef,
    pub platform_location_id: Option<String>,
    pub quantity: i64,
}

/// The three parallel draft lists a scan produces, linked by temporary ids.
///
/// Nothing here may be persisted directly: the scan processor upserts the
/// products first, resolves `temp-product-*` keys to real ids, rewires the
/// variants, and repeats for inventory levels.
#[derive(Debug, Clone, Default)]
pub struct CanonicalBatch {
    pub products: Vec<ProductDraft>,
    pub variants: Vec<VariantDraft>,
    pub levels: Vec<LevelDraft>,
}

impl CanonicalBatch {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Translate fully hydrated platform products into canonical drafts.
///
/// Every cross-reference uses temporary string ids derived from platform
/// ids, so re-running the translation over the same payload yields the same
/// keys — the scan pipeline stays idempotent end to end.
pub fn map_to_canonical(products: &[PlatformProductData]) -> CanonicalBatch {
    let mut batch = CanonicalBatch::default();

    for product in products {
        let product_ref = EntityRef::temp_product(&product.platform_product_id);

        batch.products.push(ProductDraft {
            temp_id: product_ref.clone(),
            platform_product_id: product.platform_product_id.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            image_urls: product.image_urls.clone(),
            is_archived: product.is_archived,
        });

        for variant in &product.variants {
            let variant_ref = EntityRef::temp_variant(&variant.platform_variant_id);

            batch.variants.push(VariantDraft {
                temp_id: variant_ref.clone(),
                product_ref: product_ref.clone(),
                platform_variant_id: variant.platform_variant_id.clone(),
                sku: variant.sku.clone(),
                barcode: variant.barcode.clone(),
                title: variant.title.clone(),
                description: variant.description.clone(),
                price: variant.price,
                compare_at_price: variant.compare_at_price,
                cost: variant.cost,
                weight: variant.weight,
                weight_unit: variant.weight_unit.clone(),
                options: variant.options.clone(),
                is_taxable: variant.is_taxable,
                tax_code: variant.tax_code.clone(),
                requires_shipping: variant.requires_shipping,
                image_url: variant.image_url.clone(),
            });

            for level in &variant.inventory {
                batch.levels.push(LevelDraft {
                    variant_ref: variant_ref.clone(),
                    platform_location_id: level.platform_location_id.clone(),
                    quantity: level.quantity.max(0),
                });
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::types::{PlatformInventoryData, PlatformVariantData};

    fn variant(id: &str, sku: &str, inventory: Vec<PlatformInventoryData>) -> PlatformVariantData {
        PlatformVariantData {
            platform_variant_id: id.to_string(),
            sku: Some(sku.to_string()),
            barcode: None,
            title: "Widget".to_string(),
            description: None,
            price: Decimal::new(1000, 2),
            compare_at_price: None,
            cost: None,
            weight: None,
            weight_unit: None,
            options: HashMap::new(),
            is_taxable: true,
            tax_code: None,
            requires_shipping: true,
            image_url: None,
            inventory,
            updated_at: None,
        }
    }

    #[test]
    fn drafts_cross_link_through_temp_ids() {
        let products = vec![PlatformProductData {
            platform_product_id: "p1".to_string(),
            title: "Widget".to_string(),
            description: None,
            image_urls: vec!["https://img/1.png".to_string()],
            is_archived: false,
            variants: vec![
                variant(
                    "v1",
                    "A",
                    vec![PlatformInventoryData {
                        platform_location_id: Some("L1".to_string()),
                        quantity: 5,
                    }],
                ),
                variant("v2", "B", vec![]),
            ],
            variants_count: Some(2),
        }];

        let batch = map_to_canonical(&products);

        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.variants.len(), 2);
        assert_eq!(batch.levels.len(), 1);

        let product_ref = &batch.products[0].temp_id;
        assert_eq!(*product_ref, EntityRef::temp_product("p1"));
        assert!(batch.variants.iter().all(|v| v.product_ref == *product_ref));
        assert_eq!(batch.levels[0].variant_ref, EntityRef::temp_variant("v1"));
        assert_eq!(batch.levels[0].quantity, 5);
    }

    #[test]
    fn translation_is_deterministic() {
        let products = vec![PlatformProductData {
            platform_product_id: "p9".to_string(),
            title: "Thing".to_string(),
            description: None,
            image_urls: vec![],
            is_archived: false,
            variants: vec![variant("v9", "SKU-9", vec![])],
            variants_count: None,
        }];

        let first = map_to_canonical(&products);
        let second = map_to_canonical(&products);

        assert_eq!(first.products[0].temp_id, second.products[0].temp_id);
        assert_eq!(first.variants[0].temp_id, second.variants[0].temp_id);
    }

    #[test]
    fn negative_platform_quantities_clamp_to_zero() {
        let products = vec![PlatformProductData {
            platform_product_id: "p1".to_string(),
            title: "Widget".to_string(),
            description: None,
            image_urls: vec![],
            is_archived: false,
            variants: vec![variant(
                "v1",
                "A",
                vec![PlatformInventoryData {
                    platform_location_id: None,
                    quantity: -3,
                }],
            )],
            variants_count: None,
        }];

        let batch = map_to_canonical(&products);
        assert_eq!(batch.levels[0].quantity, 0);
    }
}
