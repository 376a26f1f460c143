//! Webhook event processing: apply a platform's change to the canonical
//! store, then fan it out to every *other* linked connection.
//!
//! The origin connection never receives an echo of its own change, and an
//! update carrying data identical to the current canonical state is a
//! no-op at the persistence layer.

use crate::context::SyncContext;
use crate::push::PushCoordinator;
use channelsync_catalog::mapper::canonical::map_to_canonical;
use channelsync_catalog::mapper::PlatformProductData;
use channelsync_catalog::model::{
    EntityRef, InventoryLevel, PlatformProductMapping, Product, ProductVariant,
};
use channelsync_core::activity::events;
use channelsync_core::{Error, ErrorCode, Result};
use channelsync_platforms::types::WebhookEvent;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct WebhookProcessor {
    context: Arc<SyncContext>,
    push: Arc<PushCoordinator>,
}

impl WebhookProcessor {
    pub fn new(context: Arc<SyncContext>, push: Arc<PushCoordinator>) -> Self {
        Self { context, push }
    }

    pub async fn process(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        event: WebhookEvent,
    ) -> Result<()> {
        match event {
            WebhookEvent::ProductCreated { product } => {
                self.handle_product_upsert(connection_id, user_id, product, true)
                    .await
            }
            WebhookEvent::ProductUpdated { product } => {
                self.handle_product_upsert(connection_id, user_id, product, false)
                    .await
            }
            WebhookEvent::ProductDeleted {
                platform_product_id,
            } => {
                self.handle_product_deleted(connection_id, user_id, &platform_product_id)
                    .await
            }
            WebhookEvent::InventoryChanged {
                platform_variant_id,
                platform_location_id,
                quantity,
            } => {
                self.handle_inventory_changed(
                    connection_id,
                    user_id,
                    &platform_variant_id,
                    platform_location_id,
                    quantity,
                )
                .await
            }
        }
    }

    async fn handle_product_upsert(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        incoming: PlatformProductData,
        created: bool,
    ) -> Result<()> {
        // Locate the canonical product through the origin mapping, when one
        // exists; an unmapped update degrades to a create.
        let existing = match incoming.variants.first() {
            Some(first_variant) => {
                self.context
                    .store
                    .get_mapping_by_platform_variant(
                        connection_id,
                        &first_variant.platform_variant_id,
                    )
                    .await?
            }
            None => None,
        };

        if let Some(mapping) = &existing {
            if let Some(variant) = self
                .context
                .store
                .get_variant(user_id, mapping.product_variant_id)
                .await?
            {
                let product = self
                    .context
                    .store
                    .get_product(user_id, variant.product_id)
                    .await?;
                let variants = self
                    .context
                    .store
                    .get_variants_for_product(user_id, variant.product_id)
                    .await?;

                if let Some(product) = product {
                    if product_matches_incoming(&product, &variants, &incoming) {
                        debug!(
                            %connection_id,
                            platform_product_id = %incoming.platform_product_id,
                            "webhook carries no changes; skipping persistence"
                        );
                        return Ok(());
                    }
                }
            }
        }

        let product_id = self
            .persist_incoming_product(connection_id, user_id, &incoming)
            .await?;

        let event_type = if created {
            events::WEBHOOK_PRODUCT_CREATED
        } else {
            events::WEBHOOK_PRODUCT_UPDATED
        };
        self.context
            .activity
            .success(
                user_id,
                "Product",
                product_id,
                event_type,
                "platform change applied to canonical catalog",
                serde_json::json!({
                    "connectionId": connection_id,
                    "platformProductId": incoming.platform_product_id,
                }),
            )
            .await;

        // Fan out to the other connections. The origin is naturally
        // suppressed for creates (it already holds the mapping rows written
        // above); updates go through the mapping-guarded update path.
        if existing.is_none() {
            self.push.execute_product_create(user_id, product_id).await
        } else {
            self.push.execute_product_update(user_id, product_id).await
        }
    }

    /// Persist one platform product into canonical form and write mapping
    /// rows for the origin connection. Mirrors scan stages 4–7 at single
    /// product scale, with the same temp-id discipline.
    ///
    /// Variants the origin connection already maps keep their canonical
    /// ids, so a SKU-less variant converges on its existing row instead of
    /// minting a new one on every webhook.
    async fn persist_incoming_product(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        incoming: &PlatformProductData,
    ) -> Result<Uuid> {
        let batch = map_to_canonical(std::slice::from_ref(incoming));

        // Resolve canonical ids already known through the origin mappings.
        let mut known_variant_ids: HashMap<String, Uuid> = HashMap::new();
        let mut known_product_id: Option<Uuid> = None;
        for variant_draft in &batch.variants {
            let Some(mapping) = self
                .context
                .store
                .get_mapping_by_platform_variant(
                    connection_id,
                    &variant_draft.platform_variant_id,
                )
                .await?
            else {
                continue;
            };

            known_variant_ids.insert(
                variant_draft.platform_variant_id.clone(),
                mapping.product_variant_id,
            );
            if known_product_id.is_none() {
                known_product_id = self
                    .context
                    .store
                    .get_variant(user_id, mapping.product_variant_id)
                    .await?
                    .map(|variant| variant.product_id);
            }
        }

        let draft = batch.products.first().ok_or_else(|| {
            Error::new(ErrorCode::InvalidInput, "webhook product mapped to nothing")
        })?;
        let mut product = Product::new(user_id, draft.title.clone())
            .with_image_urls(draft.image_urls.clone())
            .with_origin_key(Product::scan_origin_key(
                connection_id,
                &draft.platform_product_id,
            ));
        product.description = draft.description.clone();
        product.is_archived = draft.is_archived;
        if let Some(product_id) = known_product_id {
            // A mapped product may predate any scan provenance (e.g. it was
            // created canonically and pushed out); upsert by its real id
            // and leave the stored provenance untouched.
            product.id = product_id;
            product.origin_key = None;
        }

        let persisted_product = self
            .context
            .store
            .upsert_products(user_id, vec![product])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorCode::InternalServerError, "product upsert returned nothing"))?;

        let mut variant_rows = Vec::new();
        for variant_draft in &batch.variants {
            let mut variant = ProductVariant::new(
                persisted_product.id,
                user_id,
                variant_draft.title.clone(),
                variant_draft.price,
            );
            if let Some(variant_id) = known_variant_ids.get(&variant_draft.platform_variant_id) {
                variant.id = *variant_id;
            }
            variant.sku = variant_draft.sku.clone();
            variant.barcode = variant_draft.barcode.clone();
            variant.description = variant_draft.description.clone();
            variant.compare_at_price = variant_draft.compare_at_price;
            variant.cost = variant_draft.cost;
            variant.weight = variant_draft.weight;
            variant.weight_unit = variant_draft.weight_unit.clone();
            variant.options = Json(variant_draft.options.clone());
            variant.is_taxable = variant_draft.is_taxable;
            variant.tax_code = variant_draft.tax_code.clone();
            variant.requires_shipping = variant_draft.requires_shipping;
            variant_rows.push(variant);
        }
        let persisted_variants = self
            .context
            .store
            .upsert_variants(user_id, variant_rows)
            .await?;

        let mut variant_ids: HashMap<EntityRef, Uuid> = HashMap::new();
        for (variant_draft, persisted) in batch.variants.iter().zip(persisted_variants.iter()) {
            variant_ids.insert(variant_draft.temp_id.clone(), persisted.id);
        }

        // Origin mapping rows: the platform ids are already known here.
        for (variant_draft, persisted) in batch.variants.iter().zip(persisted_variants.iter()) {
            let mut mapping = PlatformProductMapping::new(
                connection_id,
                persisted.id,
                incoming.platform_product_id.clone(),
                Some(variant_draft.platform_variant_id.clone()),
            )
            .with_platform_sku(variant_draft.sku.clone());
            mapping.mark_synced();
            self.context.store.upsert_mapping(mapping).await?;
        }

        let mut level_rows = Vec::new();
        for level_draft in &batch.levels {
            let Some(variant_id) = variant_ids.get(&level_draft.variant_ref).copied() else {
                continue;
            };
            level_rows.push(InventoryLevel::new(
                variant_id,
                connection_id,
                level_draft.platform_location_id.clone(),
                level_draft.quantity,
            ));
        }
        if !level_rows.is_empty() {
            self.context
                .store
                .upsert_inventory_levels(user_id, level_rows)
                .await?;
        }

        Ok(persisted_product.id)
    }

    async fn handle_product_deleted(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        platform_product_id: &str,
    ) -> Result<()> {
        let mappings = self
            .context
            .store
            .get_mappings_by_platform_product(connection_id, platform_product_id)
            .await?;

        if mappings.is_empty() {
            debug!(
                %connection_id,
                platform_product_id,
                "delete webhook for unmapped product; nothing to do"
            );
            return Ok(());
        }

        let canonical_variant = mappings[0].product_variant_id;
        for mapping in &mappings {
            self.context.store.delete_mapping(mapping.id).await?;
        }

        info!(
            %connection_id,
            platform_product_id,
            removed = mappings.len(),
            "platform product deleted; origin mappings removed"
        );
        self.context
            .activity
            .warning(
                user_id,
                "ProductVariant",
                canonical_variant,
                events::WEBHOOK_PRODUCT_DELETED,
                "product deleted on platform; canonical copy kept for review",
                serde_json::json!({
                    "connectionId": connection_id,
                    "platformProductId": platform_product_id,
                }),
            )
            .await;

        Ok(())
    }

    async fn handle_inventory_changed(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        platform_variant_id: &str,
        platform_location_id: Option<String>,
        quantity: i64,
    ) -> Result<()> {
        let mapping = self
            .context
            .store
            .get_mapping_by_platform_variant(connection_id, platform_variant_id)
            .await?;
        let Some(mapping) = mapping else {
            warn!(
                %connection_id,
                platform_variant_id,
                "inventory webhook for unmapped variant; dropping"
            );
            return Ok(());
        };

        let variant_id = mapping.product_variant_id;
        self.context
            .store
            .upsert_inventory_levels(
                user_id,
                vec![InventoryLevel::new(
                    variant_id,
                    connection_id,
                    platform_location_id.clone(),
                    quantity,
                )],
            )
            .await?;

        self.context
            .activity
            .success(
                user_id,
                "ProductVariant",
                variant_id,
                events::WEBHOOK_INVENTORY_CHANGED,
                "platform inventory change applied",
                serde_json::json!({
                    "connectionId": connection_id,
                    "platformLocationId": platform_location_id,
                    "quantity": quantity,
                }),
            )
            .await;

        // Fan the new absolute quantity out to every other mapped
        // connection at its own locations. The origin never hears its own
        // change back.
        self.fan_out_inventory(connection_id, user_id, variant_id, quantity)
            .await
    }

    async fn fan_out_inventory(
        &self,
        origin_connection_id: Uuid,
        user_id: Uuid,
        variant_id: Uuid,
        quantity: i64,
    ) -> Result<()> {
        let levels = self
            .context
            .store
            .get_levels_for_variant(user_id, variant_id)
            .await?;

        let mut transient: Option<Error> = None;

        for connection in self.context.store.list_enabled_connections(user_id).await? {
            if connection.id == origin_connection_id {
                debug!(connection_id = %connection.id, "origin connection; suppressing echo");
                continue;
            }
            if connection.status.is_busy() {
                continue;
            }

            let mapping = self
                .context
                .store
                .get_mapping_for_variant(connection.id, variant_id)
                .await?;
            let Some(mapping) = mapping else {
                warn!(
                    connection_id = %connection.id,
                    %variant_id,
                    "no mapping for connection; inventory fan-out skipped"
                );
                continue;
            };
            let Some(platform_variant_id) = mapping.platform_variant_id.clone() else {
                continue;
            };

            // The connection's own level locations; its default location
            // when it has none yet.
            let mut locations: Vec<Option<String>> = levels
                .iter()
                .filter(|level| level.platform_connection_id == connection.id)
                .map(|level| level.platform_location_id.clone())
                .collect();
            if locations.is_empty() {
                locations.push(None);
            }

            let updates: Vec<channelsync_platforms::types::InventoryUpdate> = locations
                .into_iter()
                .map(|location| channelsync_platforms::types::InventoryUpdate {
                    platform_product_id: mapping.platform_product_id.clone(),
                    platform_variant_id: platform_variant_id.clone(),
                    platform_location_id: location,
                    quantity,
                })
                .collect();

            let adapter = self.context.adapter_for(&connection)?;
            let credentials = self.context.credentials(&connection)?;
            if let Err(err) = adapter.set_inventory(&connection, &credentials, &updates).await {
                warn!(
                    connection_id = %connection.id,
                    error = %err,
                    "inventory fan-out failed for connection"
                );
                self.context
                    .activity
                    .error(
                        user_id,
                        "ProductVariant",
                        variant_id,
                        events::INVENTORY_PUSH_FAILED,
                        err.to_string(),
                        serde_json::json!({ "connectionId": connection.id }),
                    )
                    .await;
                if err.is_retryable() && transient.is_none() {
                    transient = Some(err);
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Field-equality gate for the update no-op law.
fn product_matches_incoming(
    product: &Product,
    variants: &[ProductVariant],
    incoming: &PlatformProductData,
) -> bool {
    if product.title != incoming.title
        || product.description != incoming.description
        || product.is_archived != incoming.is_archived
        || product.image_urls != incoming.image_urls
    {
        return false;
    }

    if variants.len() != incoming.variants.len() {
        return false;
    }

    for incoming_variant in &incoming.variants {
        let matched = variants.iter().any(|variant| {
            variant.sku.as_deref() == incoming_variant.sku.as_deref()
                && variant.barcode.as_deref() == incoming_variant.barcode.as_deref()
                && variant.title == incoming_variant.title
                && variant.price == incoming_variant.price
                && variant.options.0 == incoming_variant.options
        });
        if !matched {
            return false;
        }
    }

    true
}
