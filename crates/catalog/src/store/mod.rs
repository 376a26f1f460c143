//! # Persistence Contract
//!
//! Batch upserts keyed by the declared uniqueness invariants, id/parent
//! lookups, and partial patches. No cross-table transactions: every
//! multi-step write in the processors is designed to be eventually
//! consistent under idempotent retry.
//!
//! Every write path takes the calling user's id and fails with
//! `AuthorizationFailed` when an entity's ownership does not match.

pub mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use crate::model::product::VariantImage;
use crate::model::{
    ConnectionStatus, InventoryLevel, PlatformConnection, PlatformProductMapping, PlatformType,
    Product, ProductVariant, SyncStatus,
};
use async_trait::async_trait;
use channelsync_core::Result;
use uuid::Uuid;

pub use postgres::PgCatalogStore;

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryCatalogStore;

/// Field key a webhook locator matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLocator {
    /// Shopify shop domain, from the `shop` data key.
    ShopDomain,
    /// Square/Clover merchant id, from the `merchantId` data key.
    MerchantId,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // === Products ===

    /// Batch upsert on the scan origin key (falling back to id for manual
    /// products). Returns the persisted rows with their real ids.
    async fn upsert_products(&self, user_id: Uuid, products: Vec<Product>) -> Result<Vec<Product>>;

    async fn get_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Product>>;

    /// Delete a product; variants, inventory levels and images cascade.
    async fn delete_product(&self, user_id: Uuid, product_id: Uuid) -> Result<()>;

    // === Variants ===

    /// Batch upsert on `(user_id, sku)` (case-insensitive) for variants
    /// with a SKU; SKU-less variants upsert by id. Returns the persisted
    /// rows.
    async fn upsert_variants(
        &self,
        user_id: Uuid,
        variants: Vec<ProductVariant>,
    ) -> Result<Vec<ProductVariant>>;

    async fn get_variant(&self, user_id: Uuid, variant_id: Uuid) -> Result<Option<ProductVariant>>;

    async fn get_variants_for_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<ProductVariant>>;

    /// Every variant the user owns; the suggester's candidate pool.
    async fn get_variants_for_user(&self, user_id: Uuid) -> Result<Vec<ProductVariant>>;

    // === Variant images ===

    /// Best-effort batch write of `(variant, url, position)` rows.
    async fn upsert_variant_images(&self, user_id: Uuid, images: Vec<VariantImage>) -> Result<()>;

    // === Inventory ===

    /// Batch upsert on `(variant, connection, location)`.
    async fn upsert_inventory_levels(
        &self,
        user_id: Uuid,
        levels: Vec<InventoryLevel>,
    ) -> Result<Vec<InventoryLevel>>;

    async fn get_levels_for_variant(
        &self,
        user_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Vec<InventoryLevel>>;

    // === Connections ===

    async fn insert_connection(&self, connection: PlatformConnection)
        -> Result<PlatformConnection>;

    async fn get_connection(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Result<Option<PlatformConnection>>;

    async fn list_enabled_connections(&self, user_id: Uuid) -> Result<Vec<PlatformConnection>>;

    /// Connections matching a webhook locator, oldest first.
    async fn find_connections_by_locator(
        &self,
        platform_type: PlatformType,
        locator: ConnectionLocator,
        value: &str,
    ) -> Result<Vec<PlatformConnection>>;

    async fn update_connection_status(
        &self,
        connection_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<()>;

    /// Shallow-merge the patch object into `platform_specific_data`.
    async fn patch_connection_data(
        &self,
        connection_id: Uuid,
        patch: serde_json::Value,
    ) -> Result<()>;

    /// Stamp `last_sync_attempt_at`, and `last_sync_success_at` on success.
    async fn touch_connection_sync(&self, connection_id: Uuid, success: bool) -> Result<()>;

    // === Mappings ===

    /// Upsert on `(platform_connection_id, product_variant_id)`.
    async fn upsert_mapping(
        &self,
        mapping: PlatformProductMapping,
    ) -> Result<PlatformProductMapping>;

    async fn get_mapping_for_variant(
        &self,
        connection_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<PlatformProductMapping>>;

    async fn get_mapping_by_platform_variant(
        &self,
        connection_id: Uuid,
        platform_variant_id: &str,
    ) -> Result<Option<PlatformProductMapping>>;

    /// All mappings for one platform product on one connection.
    async fn get_mappings_by_platform_product(
        &self,
        connection_id: Uuid,
        platform_product_id: &str,
    ) -> Result<Vec<PlatformProductMapping>>;

    /// All mappings for a product's variants on one connection.
    async fn get_mappings_for_product(
        &self,
        connection_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<PlatformProductMapping>>;

    async fn delete_mapping(&self, mapping_id: Uuid) -> Result<()>;

    async fn update_mapping_sync_status(
        &self,
        mapping_id: Uuid,
        status: SyncStatus,
        error_message: Option<String>,
    ) -> Result<()>;
}
