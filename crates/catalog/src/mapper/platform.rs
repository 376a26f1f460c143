use crate::model::{InventoryLevel, Product, ProductVariant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Whether the input is for a create or an update push.
#[derive(Debug, Clone)]
pub enum PushMode {
    Create,
    /// Existing canonical-variant → platform-variant links for the target
    /// connection. Variants present here keep their platform id; the rest
    /// are sent as additions.
    Update {
        mapped_variant_ids: HashMap<Uuid, String>,
    },
}

/// Inventory quantity for one platform location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationQuantity {
    pub platform_location_id: Option<String>,
    pub quantity: i64,
}

/// Platform-neutral product payload for create/update calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProductInput {
    pub title: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub variants: Vec<PlatformVariantInput>,
}

/// Platform-neutral variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformVariantInput {
    pub canonical_variant_id: Uuid,
    /// Present on update for variants that already exist on the platform.
    pub platform_variant_id: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub options: HashMap<String, String>,
    pub is_taxable: bool,
    pub tax_code: Option<String>,
    pub requires_shipping: bool,
    pub image_url: Option<String>,
    /// Absolute quantity per target location; 0 where canonical data is
    /// absent.
    pub quantities: Vec<LocationQuantity>,
}

/// Result of building a platform input.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// `None` when nothing pushable remained (e.g. every variant lacked a
    /// SKU on a create path).
    pub input: Option<PlatformProductInput>,
    /// Canonical variant ids that were dropped, with the reason.
    pub dropped: Vec<(Uuid, String)>,
}

/// Build the deterministic platform payload for a create or update push.
///
/// Rules:
/// - On create, variants without a usable SKU are dropped (most platforms
///   reject them); on update, a variant that is already mapped keeps its
///   platform id and is sent even with an empty SKU — rejecting it is the
///   platform's prerogative.
/// - A single-variant product without options gets the synthetic
///   `"Title" → "Default Title"` option.
/// - Every target location receives an absolute quantity, defaulting to 0.
pub fn build_platform_input(
    product: &Product,
    variants: &[ProductVariant],
    levels: &[InventoryLevel],
    target_locations: &[Option<String>],
    mode: &PushMode,
) -> BuildOutcome {
    let mut dropped = Vec::new();
    let mut variant_inputs = Vec::new();

    let synthesize_options = variants.len() == 1;

    for variant in variants {
        let platform_variant_id = match mode {
            PushMode::Create => None,
            PushMode::Update { mapped_variant_ids } => {
                mapped_variant_ids.get(&variant.id).cloned()
            }
        };

        let has_sku = variant.effective_sku().is_some();
        if !has_sku && platform_variant_id.is_none() {
            dropped.push((variant.id, "variant has no SKU".to_string()));
            continue;
        }

        let mut options = variant.options.0.clone();
        if synthesize_options && options.is_empty() {
            options.insert("Title".to_string(), "Default Title".to_string());
        }

        let image_url = variant.image_id.as_ref().and_then(|image_id| {
            image_id
                .parse::<usize>()
                .ok()
                .and_then(|position| product.image_urls.get(position).cloned())
        });

        let quantities = target_locations
            .iter()
            .map(|location| LocationQuantity {
                platform_location_id: location.clone(),
                quantity: levels
                    .iter()
                    .find(|level| {
                        level.product_variant_id == variant.id
                            && level.platform_location_id.as_deref() == location.as_deref()
                    })
                    .map(|level| level.quantity)
                    .unwrap_or(0),
            })
            .collect();

        variant_inputs.push(PlatformVariantInput {
            canonical_variant_id: variant.id,
            platform_variant_id,
            sku: variant.effective_sku().map(str::to_string),
            barcode: variant.barcode.clone(),
            title: variant.title.clone(),
            price: variant.price,
            compare_at_price: variant.compare_at_price,
            weight: variant.weight,
            weight_unit: variant.weight_unit.clone(),
            options,
            is_taxable: variant.is_taxable,
            tax_code: variant.tax_code.clone(),
            requires_shipping: variant.requires_shipping,
            image_url,
            quantities,
        });
    }

    let input = if variant_inputs.is_empty() {
        None
    } else {
        Some(PlatformProductInput {
            title: product.title.clone(),
            description: product.description.clone(),
            image_urls: product.image_urls.clone(),
            variants: variant_inputs,
        })
    };

    BuildOutcome { input, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Product, Vec<ProductVariant>, Vec<InventoryLevel>) {
        let user_id = Uuid::new_v4();
        let product = Product::new(user_id, "Classic Tee")
            .with_image_urls(vec!["https://img/a.png".to_string()]);

        let variant = ProductVariant::new(product.id, user_id, "Classic Tee", Decimal::new(2500, 2))
            .with_sku("TEE-1");
        let connection_id = Uuid::new_v4();
        let level = InventoryLevel::new(variant.id, connection_id, Some("L1".to_string()), 7);

        (product, vec![variant], vec![level])
    }

    #[test]
    fn single_variant_gets_synthetic_option() {
        let (product, variants, levels) = fixture();
        let outcome = build_platform_input(
            &product,
            &variants,
            &levels,
            &[Some("L1".to_string())],
            &PushMode::Create,
        );

        let input = outcome.input.unwrap();
        assert_eq!(
            input.variants[0].options.get("Title").map(String::as_str),
            Some("Default Title")
        );
    }

    #[test]
    fn create_drops_variants_without_sku() {
        let (product, mut variants, levels) = fixture();
        variants[0].sku = None;

        let outcome = build_platform_input(
            &product,
            &variants,
            &levels,
            &[Some("L1".to_string())],
            &PushMode::Create,
        );

        assert!(outcome.input.is_none());
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].0, variants[0].id);
    }

    #[test]
    fn update_keeps_mapped_variant_with_empty_sku() {
        let (product, mut variants, levels) = fixture();
        variants[0].sku = None;

        let mut mapped = HashMap::new();
        mapped.insert(variants[0].id, "platform-var-9".to_string());

        let outcome = build_platform_input(
            &product,
            &variants,
            &levels,
            &[Some("L1".to_string())],
            &PushMode::Update {
                mapped_variant_ids: mapped,
            },
        );

        let input = outcome.input.unwrap();
        assert_eq!(
            input.variants[0].platform_variant_id.as_deref(),
            Some("platform-var-9")
        );
        assert!(input.variants[0].sku.is_none());
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn every_target_location_gets_a_quantity() {
        let (product, variants, levels) = fixture();
        let outcome = build_platform_input(
            &product,
            &variants,
            &levels,
            &[Some("L1".to_string()), Some("L2".to_string()), None],
            &PushMode::Create,
        );

        let quantities = &outcome.input.unwrap().variants[0].quantities;
        assert_eq!(quantities.len(), 3);
        assert_eq!(quantities[0].quantity, 7);
        assert_eq!(quantities[1].quantity, 0);
        assert_eq!(quantities[2].quantity, 0);
    }
}
