//! Initial scan: pull a connection's catalog into canonical form.
//!
//! The pipeline is an ordered sequence of idempotent stages with explicit
//! progress milestones. Stages 2–3 are pure and re-runnable; stages 4–7
//! upsert on declared unique keys, so a worker crash at any point leaves
//! the store convergent under retry.

use crate::context::SyncContext;
use channelsync_catalog::mapper::canonical::map_to_canonical;
use channelsync_catalog::mapper::suggest::SuggestionEngine;
use channelsync_catalog::mapper::types::PlatformVariantSummary;
use channelsync_catalog::model::product::VariantImage;
use channelsync_catalog::model::{
    ConnectionStatus, EntityRef, InventoryLevel, PlatformConnection, Product, ProductVariant,
    ScanSummary,
};
use channelsync_core::activity::events;
use channelsync_core::jobs::JobContext;
use channelsync_core::{Error, ErrorCode, Result};
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct InitialScanProcessor {
    context: Arc<SyncContext>,
}

impl InitialScanProcessor {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }

    /// Run the full scan pipeline for one connection.
    ///
    /// On any uncaught error the connection flips to `error` and the error
    /// is re-thrown for the queue to retry.
    pub async fn run(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        job: &JobContext,
    ) -> Result<ScanSummary> {
        match self.run_pipeline(connection_id, user_id, job).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                warn!(
                    %connection_id,
                    error = %err,
                    "scan failed; flipping connection to error"
                );
                let _ = self
                    .context
                    .store
                    .update_connection_status(connection_id, ConnectionStatus::Error)
                    .await;
                self.context
                    .activity
                    .error(
                        user_id,
                        "PlatformConnection",
                        connection_id,
                        events::SCAN_FAILED,
                        err.to_string(),
                        serde_json::json!({ "attempt": job.attempt }),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        job: &JobContext,
    ) -> Result<ScanSummary> {
        // 1. Validate ownership and move to scanning.
        let connection = self.validate(connection_id, user_id).await?;
        self.context
            .store
            .update_connection_status(connection_id, ConnectionStatus::Scanning)
            .await?;

        // 2. Fetch the full catalog.
        job.report_progress(10, "fetching catalog from platform").await;
        let credentials = self.context.credentials(&connection)?;
        let adapter = self.context.adapter_for(&connection)?;
        let fetched = adapter.fetch_all(&connection, &credentials).await?;
        job.report_progress(30, "catalog fetched").await;

        // 3. Map to canonical drafts linked by temporary ids.
        let batch = map_to_canonical(&fetched.products);
        job.report_progress(50, "mapped to canonical form").await;

        // 4. Persist products; resolve temp product ids.
        let mut product_rows = Vec::with_capacity(batch.products.len());
        for draft in &batch.products {
            let mut product = Product::new(user_id, draft.title.clone())
                .with_image_urls(draft.image_urls.clone())
                .with_origin_key(Product::scan_origin_key(
                    connection_id,
                    &draft.platform_product_id,
                ));
            product.description = draft.description.clone();
            product.is_archived = draft.is_archived;
            product_rows.push(product);
        }
        let persisted_products = self
            .context
            .store
            .upsert_products(user_id, product_rows)
            .await?;

        let mut product_ids: HashMap<EntityRef, Uuid> = HashMap::new();
        for (draft, persisted) in batch.products.iter().zip(persisted_products.iter()) {
            product_ids.insert(draft.temp_id.clone(), persisted.id);
        }
        job.report_progress(60, "products persisted").await;

        // 5. Rewire variants to real product ids; drop orphans.
        let mut variant_rows = Vec::new();
        let mut kept_variant_drafts = Vec::new();
        for draft in &batch.variants {
            let Some(product_id) = product_ids.get(&draft.product_ref).copied() else {
                warn!(
                    platform_variant_id = %draft.platform_variant_id,
                    "variant parent failed to persist; dropping"
                );
                continue;
            };

            let mut variant =
                ProductVariant::new(product_id, user_id, draft.title.clone(), draft.price);
            variant.sku = draft.sku.clone();
            variant.barcode = draft.barcode.clone();
            variant.description = draft.description.clone();
            variant.compare_at_price = draft.compare_at_price;
            variant.cost = draft.cost;
            variant.weight = draft.weight;
            variant.weight_unit = draft.weight_unit.clone();
            variant.options = Json(draft.options.clone());
            variant.is_taxable = draft.is_taxable;
            variant.tax_code = draft.tax_code.clone();
            variant.requires_shipping = draft.requires_shipping;
            variant_rows.push(variant);
            kept_variant_drafts.push(draft);
        }
        let persisted_variants = self
            .context
            .store
            .upsert_variants(user_id, variant_rows)
            .await?;

        let mut variant_ids: HashMap<EntityRef, Uuid> = HashMap::new();
        for (draft, persisted) in kept_variant_drafts.iter().zip(persisted_variants.iter()) {
            variant_ids.insert(draft.temp_id.clone(), persisted.id);
        }
        job.report_progress(75, "variants persisted").await;

        // 6. Variant images, best-effort.
        let mut image_rows = Vec::new();
        for draft in &kept_variant_drafts {
            let (Some(image_url), Some(variant_id)) =
                (&draft.image_url, variant_ids.get(&draft.temp_id))
            else {
                continue;
            };
            image_rows.push(VariantImage {
                product_variant_id: *variant_id,
                image_url: image_url.clone(),
                position: 0,
            });
        }
        if !image_rows.is_empty() {
            if let Err(err) = self
                .context
                .store
                .upsert_variant_images(user_id, image_rows)
                .await
            {
                warn!(error = %err, "variant image persistence failed; continuing");
            }
        }

        // 7. Rewire inventory levels; drop orphans.
        let mut level_rows = Vec::new();
        for draft in &batch.levels {
            let Some(variant_id) = variant_ids.get(&draft.variant_ref).copied() else {
                warn!("inventory level references a dropped variant; skipping");
                continue;
            };
            level_rows.push(InventoryLevel::new(
                variant_id,
                connection_id,
                draft.platform_location_id.clone(),
                draft.quantity,
            ));
        }
        let persisted_levels = self
            .context
            .store
            .upsert_inventory_levels(user_id, level_rows)
            .await?;
        job.report_progress(85, "inventory persisted").await;

        // 8. Analyze.
        let summary = ScanSummary {
            count_products: persisted_products.len() as u64,
            count_variants: persisted_variants.len() as u64,
            count_locations: fetched.locations.len() as u64,
        };
        self.context
            .store
            .patch_connection_data(
                connection_id,
                serde_json::json!({ "scanSummary": summary }),
            )
            .await?;

        // 9. Mapping suggestions.
        let platform_summaries = platform_variant_summaries(&fetched.products);
        let canonical_variants = self.context.store.get_variants_for_user(user_id).await?;
        let summaries = if platform_summaries.is_empty() {
            canonical_variant_summaries(&canonical_variants)
        } else {
            platform_summaries
        };
        let suggestions = SuggestionEngine::default().suggest(&summaries, &canonical_variants);
        self.context
            .store
            .patch_connection_data(
                connection_id,
                serde_json::json!({ "mappingSuggestions": suggestions }),
            )
            .await?;

        // 10. Hand over for review.
        self.context
            .store
            .update_connection_status(connection_id, ConnectionStatus::NeedsReview)
            .await?;
        job.report_progress(100, "scan complete").await;

        info!(
            %connection_id,
            products = summary.count_products,
            variants = summary.count_variants,
            locations = summary.count_locations,
            levels = persisted_levels.len(),
            "initial scan complete"
        );
        self.context
            .activity
            .success(
                user_id,
                "PlatformConnection",
                connection_id,
                events::SCAN_COMPLETED,
                "initial scan complete",
                serde_json::json!({
                    "countProducts": summary.count_products,
                    "countVariants": summary.count_variants,
                    "countLocations": summary.count_locations,
                }),
            )
            .await;

        Ok(summary)
    }

    async fn validate(&self, connection_id: Uuid, user_id: Uuid) -> Result<PlatformConnection> {
        self.context
            .store
            .get_connection(user_id, connection_id)
            .await?
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::ResourceNotFound,
                    "connection not found for the calling user",
                )
            })
    }
}

/// Flatten fetched products into the suggester's input.
pub fn platform_variant_summaries(
    products: &[channelsync_catalog::mapper::PlatformProductData],
) -> Vec<PlatformVariantSummary> {
    products
        .iter()
        .flat_map(|product| {
            product
                .variants
                .iter()
                .map(|variant| variant.to_summary(Some(product.platform_product_id.clone())))
        })
        .collect()
}

/// Fallback summaries built from canonical variants when the platform has
/// no variants to suggest against.
fn canonical_variant_summaries(variants: &[ProductVariant]) -> Vec<PlatformVariantSummary> {
    variants
        .iter()
        .map(|variant| PlatformVariantSummary {
            platform_variant_id: variant.id.to_string(),
            platform_product_id: Some(variant.product_id.to_string()),
            sku: variant.sku.clone(),
            barcode: variant.barcode.clone(),
            title: variant.title.clone(),
            price: Some(variant.price),
            image_url: None,
        })
        .collect()
}
