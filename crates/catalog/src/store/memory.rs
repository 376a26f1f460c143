//! In-memory catalog store for scenario tests.
//!
//! Enforces the same ownership checks and uniqueness invariants as the
//! Postgres store so the processors can be exercised end to end without a
//! database.

use super::{CatalogStore, ConnectionLocator};
use crate::model::product::VariantImage;
use crate::model::{
    ConnectionStatus, InventoryLevel, PlatformConnection, PlatformProductMapping, PlatformType,
    Product, ProductVariant, SyncStatus,
};
use async_trait::async_trait;
use channelsync_core::{Error, ErrorCode, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, ProductVariant>,
    levels: HashMap<Uuid, InventoryLevel>,
    images: Vec<VariantImage>,
    connections: HashMap<Uuid, PlatformConnection>,
    mappings: HashMap<Uuid, PlatformProductMapping>,
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    inner: Mutex<Inner>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_ownership(expected: Uuid, actual: Uuid, entity: &str) -> Result<()> {
        if expected != actual {
            return Err(Error::new(
                ErrorCode::AuthorizationFailed,
                format!("{} does not belong to the calling user", entity),
            ));
        }
        Ok(())
    }

    /// Test helper: connection by id without an ownership filter.
    pub fn connection(&self, connection_id: Uuid) -> Option<PlatformConnection> {
        self.inner
            .lock()
            .unwrap()
            .connections
            .get(&connection_id)
            .cloned()
    }

    /// Test helper: toggle a connection without going through a processor.
    pub fn set_connection_enabled(&self, connection_id: Uuid, is_enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(connection) = inner.connections.get_mut(&connection_id) {
            connection.is_enabled = is_enabled;
        }
    }

    /// Test helper: all mapping rows for a connection.
    pub fn mappings_for_connection(&self, connection_id: Uuid) -> Vec<PlatformProductMapping> {
        self.inner
            .lock()
            .unwrap()
            .mappings
            .values()
            .filter(|m| m.platform_connection_id == connection_id)
            .cloned()
            .collect()
    }

    /// Test helper: every inventory level row.
    pub fn all_levels(&self) -> Vec<InventoryLevel> {
        self.inner.lock().unwrap().levels.values().cloned().collect()
    }

    /// Test helper: every product owned by a user.
    pub fn products_for_user(&self, user_id: Uuid) -> Vec<Product> {
        self.inner
            .lock()
            .unwrap()
            .products
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Test helper: stored variant image rows.
    pub fn variant_images(&self) -> Vec<VariantImage> {
        self.inner.lock().unwrap().images.clone()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn upsert_products(&self, user_id: Uuid, products: Vec<Product>) -> Result<Vec<Product>> {
        let mut inner = self.inner.lock().unwrap();
        let mut persisted = Vec::with_capacity(products.len());

        for mut product in products {
            Self::check_ownership(user_id, product.user_id, "product")?;
            product.updated_at = Utc::now();

            let existing_id = product.origin_key.as_ref().and_then(|key| {
                inner
                    .products
                    .values()
                    .find(|p| p.origin_key.as_ref() == Some(key))
                    .map(|p| p.id)
            });

            let id = existing_id.unwrap_or(product.id);
            product.id = id;
            inner.products.insert(id, product.clone());
            persisted.push(product);
        }

        Ok(persisted)
    }

    async fn get_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Product>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .products
            .get(&product_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn delete_product(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.products.get(&product_id) {
            Some(product) if product.user_id == user_id => {}
            _ => return Err(Error::new(ErrorCode::ResourceNotFound, "product not found")),
        }

        inner.products.remove(&product_id);
        let variant_ids: Vec<Uuid> = inner
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .map(|v| v.id)
            .collect();
        for variant_id in variant_ids {
            inner.variants.remove(&variant_id);
            inner
                .levels
                .retain(|_, level| level.product_variant_id != variant_id);
            inner
                .images
                .retain(|image| image.product_variant_id != variant_id);
        }
        Ok(())
    }

    async fn upsert_variants(
        &self,
        user_id: Uuid,
        variants: Vec<ProductVariant>,
    ) -> Result<Vec<ProductVariant>> {
        let mut inner = self.inner.lock().unwrap();
        let mut persisted = Vec::with_capacity(variants.len());

        for mut variant in variants {
            Self::check_ownership(user_id, variant.user_id, "product variant")?;
            variant.updated_at = Utc::now();

            // Conflict key (user_id, sku) when the SKU is present;
            // case-insensitive, mirroring the lower(sku) unique index.
            let existing_id = variant.effective_sku().and_then(|sku| {
                inner
                    .variants
                    .values()
                    .find(|v| {
                        v.user_id == user_id
                            && v.effective_sku()
                                .map(|s| s.eq_ignore_ascii_case(sku))
                                .unwrap_or(false)
                    })
                    .map(|v| v.id)
            });

            let id = existing_id.unwrap_or(variant.id);
            variant.id = id;
            inner.variants.insert(id, variant.clone());
            persisted.push(variant);
        }

        Ok(persisted)
    }

    async fn get_variant(&self, user_id: Uuid, variant_id: Uuid) -> Result<Option<ProductVariant>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .variants
            .get(&variant_id)
            .filter(|v| v.user_id == user_id)
            .cloned())
    }

    async fn get_variants_for_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<ProductVariant>> {
        let mut variants: Vec<ProductVariant> = self
            .inner
            .lock()
            .unwrap()
            .variants
            .values()
            .filter(|v| v.product_id == product_id && v.user_id == user_id)
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.created_at);
        Ok(variants)
    }

    async fn get_variants_for_user(&self, user_id: Uuid) -> Result<Vec<ProductVariant>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .variants
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_variant_images(&self, user_id: Uuid, images: Vec<VariantImage>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for image in images {
            let owned = inner
                .variants
                .get(&image.product_variant_id)
                .map(|v| v.user_id == user_id)
                .unwrap_or(false);
            if !owned {
                continue;
            }
            inner.images.retain(|existing| {
                !(existing.product_variant_id == image.product_variant_id
                    && existing.position == image.position)
            });
            inner.images.push(image);
        }
        Ok(())
    }

    async fn upsert_inventory_levels(
        &self,
        user_id: Uuid,
        levels: Vec<InventoryLevel>,
    ) -> Result<Vec<InventoryLevel>> {
        let mut inner = self.inner.lock().unwrap();
        let mut persisted = Vec::with_capacity(levels.len());

        for mut level in levels {
            let owned = inner
                .variants
                .get(&level.product_variant_id)
                .map(|v| v.user_id == user_id)
                .unwrap_or(false);
            if !owned {
                return Err(Error::new(
                    ErrorCode::AuthorizationFailed,
                    "inventory level references a variant the calling user does not own",
                ));
            }

            let existing_id = inner
                .levels
                .values()
                .find(|existing| existing.conflict_key() == level.conflict_key())
                .map(|existing| existing.id);

            let id = existing_id.unwrap_or(level.id);
            level.id = id;
            inner.levels.insert(id, level.clone());
            persisted.push(level);
        }

        Ok(persisted)
    }

    async fn get_levels_for_variant(
        &self,
        user_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Vec<InventoryLevel>> {
        let inner = self.inner.lock().unwrap();
        let owned = inner
            .variants
            .get(&variant_id)
            .map(|v| v.user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Ok(Vec::new());
        }
        Ok(inner
            .levels
            .values()
            .filter(|level| level.product_variant_id == variant_id)
            .cloned()
            .collect())
    }

    async fn insert_connection(
        &self,
        connection: PlatformConnection,
    ) -> Result<PlatformConnection> {
        self.inner
            .lock()
            .unwrap()
            .connections
            .insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn get_connection(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Result<Option<PlatformConnection>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .connections
            .get(&connection_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_enabled_connections(&self, user_id: Uuid) -> Result<Vec<PlatformConnection>> {
        let mut connections: Vec<PlatformConnection> = self
            .inner
            .lock()
            .unwrap()
            .connections
            .values()
            .filter(|c| c.user_id == user_id && c.is_enabled)
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.created_at);
        Ok(connections)
    }

    async fn find_connections_by_locator(
        &self,
        platform_type: PlatformType,
        locator: ConnectionLocator,
        value: &str,
    ) -> Result<Vec<PlatformConnection>> {
        let key = match locator {
            ConnectionLocator::ShopDomain => "shop",
            ConnectionLocator::MerchantId => "merchantId",
        };

        let mut connections: Vec<PlatformConnection> = self
            .inner
            .lock()
            .unwrap()
            .connections
            .values()
            .filter(|c| {
                c.platform_type == platform_type
                    && c.platform_specific_data.get(key).and_then(|v| v.as_str()) == Some(value)
            })
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.created_at);
        Ok(connections)
    }

    async fn update_connection_status(
        &self,
        connection_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(connection) = inner.connections.get_mut(&connection_id) {
            connection.status = status;
            connection.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn patch_connection_data(
        &self,
        connection_id: Uuid,
        patch: serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(connection) = inner.connections.get_mut(&connection_id) {
            if let (Some(data), Some(patch_map)) = (
                connection.platform_specific_data.as_object_mut(),
                patch.as_object(),
            ) {
                for (key, value) in patch_map {
                    data.insert(key.clone(), value.clone());
                }
            }
            connection.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn touch_connection_sync(&self, connection_id: Uuid, success: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(connection) = inner.connections.get_mut(&connection_id) {
            let now = Utc::now();
            connection.last_sync_attempt_at = Some(now);
            if success {
                connection.last_sync_success_at = Some(now);
            }
            connection.updated_at = now;
        }
        Ok(())
    }

    async fn upsert_mapping(
        &self,
        mapping: PlatformProductMapping,
    ) -> Result<PlatformProductMapping> {
        let mut inner = self.inner.lock().unwrap();

        // Conflict key (connection, variant).
        let existing_id = inner
            .mappings
            .values()
            .find(|m| {
                m.platform_connection_id == mapping.platform_connection_id
                    && m.product_variant_id == mapping.product_variant_id
            })
            .map(|m| m.id);

        // The secondary uniqueness invariant (connection, platform variant).
        let duplicate_platform_variant = inner.mappings.values().any(|m| {
            Some(m.id) != existing_id
                && m.platform_connection_id == mapping.platform_connection_id
                && m.platform_variant_id.is_some()
                && m.platform_variant_id == mapping.platform_variant_id
        });
        if duplicate_platform_variant {
            return Err(Error::new(
                ErrorCode::DatabaseConstraintViolation,
                "platform variant already mapped on this connection",
            ));
        }

        let mut mapping = mapping;
        mapping.id = existing_id.unwrap_or(mapping.id);
        mapping.updated_at = Utc::now();
        inner.mappings.insert(mapping.id, mapping.clone());
        Ok(mapping)
    }

    async fn get_mapping_for_variant(
        &self,
        connection_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<PlatformProductMapping>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .mappings
            .values()
            .find(|m| {
                m.platform_connection_id == connection_id && m.product_variant_id == variant_id
            })
            .cloned())
    }

    async fn get_mapping_by_platform_variant(
        &self,
        connection_id: Uuid,
        platform_variant_id: &str,
    ) -> Result<Option<PlatformProductMapping>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .mappings
            .values()
            .find(|m| {
                m.platform_connection_id == connection_id
                    && m.platform_variant_id.as_deref() == Some(platform_variant_id)
            })
            .cloned())
    }

    async fn get_mappings_by_platform_product(
        &self,
        connection_id: Uuid,
        platform_product_id: &str,
    ) -> Result<Vec<PlatformProductMapping>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .mappings
            .values()
            .filter(|m| {
                m.platform_connection_id == connection_id
                    && m.platform_product_id == platform_product_id
            })
            .cloned()
            .collect())
    }

    async fn get_mappings_for_product(
        &self,
        connection_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<PlatformProductMapping>> {
        let inner = self.inner.lock().unwrap();
        let variant_ids: Vec<Uuid> = inner
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .map(|v| v.id)
            .collect();

        Ok(inner
            .mappings
            .values()
            .filter(|m| {
                m.platform_connection_id == connection_id
                    && variant_ids.contains(&m.product_variant_id)
            })
            .cloned()
            .collect())
    }

    async fn delete_mapping(&self, mapping_id: Uuid) -> Result<()> {
        self.inner.lock().unwrap().mappings.remove(&mapping_id);
        Ok(())
    }

    async fn update_mapping_sync_status(
        &self,
        mapping_id: Uuid,
        status: SyncStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mapping) = inner.mappings.get_mut(&mapping_id) {
            mapping.sync_status = status;
            mapping.sync_error_message = error_message;
            if status == SyncStatus::Success {
                mapping.last_synced_at = Some(Utc::now());
            }
            mapping.updated_at = Utc::now();
        }
        Ok(())
    }
}
